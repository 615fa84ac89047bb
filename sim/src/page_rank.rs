// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use pregel_core::{
    compensation_scale, Algorithm, AggregatorValue, CompensateContext, ComputeContext, JsonFormat,
    MasterContext, MasterEnv, MessageCombiner, MessageFormat, MessageIterator, SumCombiner,
    ValueAggregator, VertexCompensation, VertexComputation,
};
use serde_json::Value;
use std::sync::Arc;

const DAMPING: f64 = 0.85;
const DEFAULT_THRESHOLD: f64 = 0.00001;

/// Maximum per-vertex rank change in the last superstep
const DIFFERENCE: &str = "difference";
/// Sum of all ranks in the last superstep
const RANK_TOTAL: &str = "rank-total";
/// Rank still held by surviving vertices, tallied in recovery phase 0
const REMAINING_RANK: &str = "remaining-rank";
/// Corrective factor broadcast for recovery phase 1
const SCALE: &str = "scale";

/// PageRank over the engine: combining cache with a sum combiner, a
/// max-difference convergence aggregator, and the two-phase rank
/// redistribution when a partition is lost
pub struct PageRank {
    threshold: f64,
}

impl PageRank {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Construct from the opaque user-options document
    pub fn from_params(params: &Value) -> Self {
        let threshold = params
            .get("threshold")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_THRESHOLD);
        Self::new(threshold)
    }
}

impl Algorithm<f64, (), f64> for PageRank {
    fn name(&self) -> &str {
        "pagerank"
    }

    fn message_format(&self) -> Arc<dyn MessageFormat<f64>> {
        Arc::new(JsonFormat::new())
    }

    fn message_combiner(&self) -> Option<Arc<dyn MessageCombiner<f64>>> {
        Some(Arc::new(SumCombiner))
    }

    fn vertex_computation(&self) -> Box<dyn VertexComputation<f64, (), f64>> {
        Box::new(PageRankComputation)
    }

    fn vertex_compensation(&self) -> Option<Box<dyn VertexCompensation<f64, (), f64>>> {
        Some(Box::new(PageRankCompensation))
    }

    fn master_context(&self) -> Box<dyn MasterContext> {
        Box::new(PageRankMaster {
            threshold: self.threshold,
            total_rank: 0.0,
        })
    }

    fn aggregators(&self) -> Vec<(String, ValueAggregator)> {
        vec![
            (DIFFERENCE.to_string(), ValueAggregator::max_float(0.0)),
            (RANK_TOTAL.to_string(), ValueAggregator::sum_float()),
            (REMAINING_RANK.to_string(), ValueAggregator::sum_float()),
            (SCALE.to_string(), ValueAggregator::overwrite_float(1.0)),
        ]
    }
}

struct PageRankComputation;

impl VertexComputation<f64, (), f64> for PageRankComputation {
    fn compute(&mut self, ctx: &mut ComputeContext<'_, f64, (), f64>, messages: MessageIterator<f64>) {
        let n = ctx.vertex_count() as f64;
        let new_rank = if ctx.superstep() == 0 {
            1.0 / n
        } else {
            let sum: f64 = messages.sum();
            (1.0 - DAMPING) / n + DAMPING * sum
        };

        let diff = (new_rank - *ctx.vertex_value()).abs();
        ctx.aggregate(DIFFERENCE, AggregatorValue::Float(diff));
        ctx.aggregate(RANK_TOTAL, AggregatorValue::Float(new_rank));
        ctx.set_vertex_value(new_rank);

        let degree = ctx.edges().len();
        if degree > 0 {
            ctx.send_message_to_all_neighbours(new_rank / degree as f64);
        }
    }
}

struct PageRankMaster {
    threshold: f64,
    /// Rank total as of the last completed superstep, the pre-failure
    /// baseline for a recovery
    total_rank: f64,
}

impl MasterContext for PageRankMaster {
    fn post_global_superstep(&mut self, env: &mut MasterEnv<'_>) -> bool {
        self.total_rank = env.aggregators.get_float(RANK_TOTAL);
        // superstep 0 only seeds the initial rank; convergence is
        // meaningful from the first propagation on
        if env.superstep == 0 {
            return true;
        }
        env.aggregators.get_float(DIFFERENCE) >= self.threshold
    }

    fn post_compensation(&mut self, env: &mut MasterEnv<'_>) -> bool {
        if env.recovery_step == 0 {
            let remaining = env.aggregators.get_float(REMAINING_RANK);
            let scale = compensation_scale(
                self.total_rank,
                env.worker_count,
                env.vertex_count,
                remaining,
            );
            env.aggregators.aggregate(SCALE, AggregatorValue::Float(scale));
            return true;
        }
        false
    }
}

struct PageRankCompensation;

impl VertexCompensation<f64, (), f64> for PageRankCompensation {
    fn compensate(&mut self, ctx: &mut CompensateContext<'_, f64>, in_lost_partition: bool) {
        if ctx.recovery_step() == 0 {
            // phase 0: tally what the survivors still hold
            if !in_lost_partition {
                ctx.aggregate(
                    REMAINING_RANK,
                    AggregatorValue::Float(*ctx.vertex_value()),
                );
            }
            return;
        }
        // phase 1: reseed lost vertices, rescale the survivors
        if in_lost_partition {
            let n = ctx.vertex_count() as f64;
            ctx.set_vertex_value(1.0 / n);
        } else {
            let scaled = *ctx.vertex_value() * ctx.get_aggregated_float(SCALE);
            ctx.set_vertex_value(scaled);
        }
        ctx.vote_active();
    }
}
