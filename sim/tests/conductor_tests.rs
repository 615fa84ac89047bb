// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use pregel_core::{
    compensation_scale, AggregatorValue, Algorithm, CompensateContext, ComputeContext, Conductor,
    ConductorConfig, ConductorError, JsonFormat, MasterContext, MasterEnv, MessageFormat,
    MessageIterator, ValueAggregator, VertexCompensation, VertexComputation, WorkerContext,
    WorkerEnv,
};
use pregel_sim::{InMemoryGraph, LabelPropagation, LocalWorkerPool, PageRank};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ============================================================
// PageRank end to end
// ============================================================

#[tokio::test]
async fn test_liveness_pagerank_ring_converges() {
    let mut graph = InMemoryGraph::new(2, 2);
    for i in 0..8 {
        graph.add_vertex_to_shard(&format!("v{}", i), i % 4, 0.0);
    }
    for i in 0..8u16 {
        graph.add_edge(&format!("v{}", i), &format!("v{}", (i + 1) % 8), ());
    }

    let algorithm = PageRank::new(0.000001);
    let pool = LocalWorkerPool::new(graph, &algorithm);
    let mut conductor = Conductor::for_algorithm(pool, &algorithm, ConductorConfig::default());
    let report = conductor.run().await.expect("execution completes");

    assert!(report.halted_by_master, "convergence is a master decision");
    assert_eq!(
        report.supersteps, 2,
        "a uniform ring is stationary after one propagation"
    );

    let values = conductor.channel_mut().vertex_values().await;
    assert_eq!(values.len(), 8);
    let total: f64 = values.iter().map(|(_, _, rank)| rank).sum();
    assert!((total - 1.0).abs() < 1e-9, "rank is conserved, got {}", total);
    for (_, key, rank) in &values {
        assert!(
            (rank - 0.125).abs() < 1e-12,
            "ring rank must be uniform, {} has {}",
            key,
            rank
        );
    }

    // the master's merged aggregators hold the last superstep's totals
    let total_aggregated = conductor.aggregators().get_float("rank-total");
    assert!((total_aggregated - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_liveness_pagerank_random_graph_converges() {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(42);
    let mut graph = InMemoryGraph::new(3, 2);
    let n = 60;
    for i in 0..n {
        graph.add_vertex(&format!("v{}", i), 0.0);
    }
    for i in 0..n {
        for _ in 0..3 {
            let target = rng.random_range(0..n);
            if target != i {
                graph.add_edge(&format!("v{}", i), &format!("v{}", target), ());
            }
        }
    }

    let algorithm = PageRank::from_params(&json!({ "threshold": 0.001 }));
    let pool = LocalWorkerPool::new(graph, &algorithm);
    let mut conductor = Conductor::for_algorithm(pool, &algorithm, ConductorConfig::default());
    let report = conductor.run().await.expect("execution completes");

    assert!(report.halted_by_master, "did not converge");
    let values = conductor.channel_mut().vertex_values().await;
    let total: f64 = values.iter().map(|(_, _, rank)| rank).sum();
    assert!(total <= 1.0 + 1e-9, "rank total {} exceeds 1", total);
    for (_, key, rank) in &values {
        assert!(*rank > 0.0, "{} has non-positive rank {}", key, rank);
    }

    // the quiescence oracle held for every superstep: totals balanced
    let sent: u64 = report.worker_stats.values().map(|s| s.send_count).sum();
    let received: u64 = report.worker_stats.values().map(|s| s.received_count).sum();
    assert_eq!(sent, received, "every sent message was received");
}

// ============================================================
// Label propagation: array cache end to end, quiescence halt
// ============================================================

#[tokio::test]
async fn test_liveness_label_propagation_two_communities() {
    let mut graph = InMemoryGraph::new(2, 1);
    let triangles: [(&str, i64, u16); 6] = [
        ("a", 1, 0),
        ("b", 2, 1),
        ("c", 3, 0),
        ("d", 4, 1),
        ("e", 5, 0),
        ("f", 6, 1),
    ];
    for (key, label, shard) in triangles {
        graph.add_vertex_to_shard(key, shard, label);
    }
    for (from, to) in [("a", "b"), ("b", "c"), ("c", "a"), ("d", "e"), ("e", "f"), ("f", "d")] {
        graph.add_edge(from, to, ());
        graph.add_edge(to, from, ());
    }

    let algorithm = LabelPropagation::new();
    let pool = LocalWorkerPool::new(graph, &algorithm);
    let mut conductor = Conductor::for_algorithm(pool, &algorithm, ConductorConfig::default());
    let report = conductor.run().await.expect("execution completes");

    assert!(
        !report.halted_by_master,
        "label propagation ends by quiescence"
    );
    assert_eq!(report.supersteps, 4);

    let values: HashMap<String, i64> = conductor
        .channel_mut()
        .vertex_values()
        .await
        .into_iter()
        .map(|(_, key, label)| (key, label))
        .collect();
    for key in ["a", "b", "c"] {
        assert_eq!(values[key], 1, "community one settles on its smallest label");
    }
    for key in ["d", "e", "f"] {
        assert_eq!(values[key], 4, "community two settles on its smallest label");
    }
}

// ============================================================
// Lifecycle: master halt and reactivation
// ============================================================

struct IdleComputation;

impl VertexComputation<i64, (), i64> for IdleComputation {
    fn compute(&mut self, _ctx: &mut ComputeContext<'_, i64, (), i64>, _messages: MessageIterator<i64>) {
        // stays active so only the master can end the run
    }
}

struct HaltAfterMaster;

impl MasterContext for HaltAfterMaster {
    fn post_global_superstep(&mut self, env: &mut MasterEnv<'_>) -> bool {
        env.superstep < 2
    }
}

#[derive(Default)]
struct HookCounts {
    pre_application: AtomicU64,
    pre_superstep: AtomicU64,
    post_superstep: AtomicU64,
    post_application: AtomicU64,
}

struct CountingWorkerContext {
    counts: Arc<HookCounts>,
}

impl WorkerContext for CountingWorkerContext {
    fn pre_application(&mut self, _env: &mut WorkerEnv<'_>) {
        self.counts.pre_application.fetch_add(1, Ordering::Relaxed);
    }

    fn pre_global_superstep(&mut self, _env: &mut WorkerEnv<'_>) {
        self.counts.pre_superstep.fetch_add(1, Ordering::Relaxed);
    }

    fn post_global_superstep(&mut self, _env: &mut WorkerEnv<'_>) {
        self.counts.post_superstep.fetch_add(1, Ordering::Relaxed);
    }

    fn post_application(&mut self, _env: &mut WorkerEnv<'_>) {
        self.counts.post_application.fetch_add(1, Ordering::Relaxed);
    }
}

struct IdleAlgorithm {
    hook_counts: Arc<HookCounts>,
}

impl Algorithm<i64, (), i64> for IdleAlgorithm {
    fn name(&self) -> &str {
        "idle"
    }

    fn message_format(&self) -> Arc<dyn MessageFormat<i64>> {
        Arc::new(JsonFormat::new())
    }

    fn vertex_computation(&self) -> Box<dyn VertexComputation<i64, (), i64>> {
        Box::new(IdleComputation)
    }

    fn worker_context(&self) -> Box<dyn WorkerContext> {
        Box::new(CountingWorkerContext {
            counts: Arc::clone(&self.hook_counts),
        })
    }

    fn master_context(&self) -> Box<dyn MasterContext> {
        Box::new(HaltAfterMaster)
    }
}

#[tokio::test]
async fn test_safety_master_false_halts_the_run() {
    let mut graph = InMemoryGraph::new(2, 1);
    graph.add_vertex_to_shard("a", 0, 0);
    graph.add_vertex_to_shard("b", 1, 0);

    let algorithm = IdleAlgorithm {
        hook_counts: Arc::new(HookCounts::default()),
    };
    let pool = LocalWorkerPool::new(graph, &algorithm);
    let mut conductor = Conductor::for_algorithm(pool, &algorithm, ConductorConfig::default());
    let report = conductor.run().await.expect("execution completes");

    assert!(report.halted_by_master);
    assert_eq!(
        report.supersteps, 3,
        "the superstep whose hook returned false still completed"
    );

    // every worker context hook fired at the right cadence
    let counts = &algorithm.hook_counts;
    assert_eq!(counts.pre_application.load(Ordering::Relaxed), 2);
    assert_eq!(counts.pre_superstep.load(Ordering::Relaxed), 2 * 3);
    assert_eq!(counts.post_superstep.load(Ordering::Relaxed), 2 * 3);
    assert_eq!(counts.post_application.load(Ordering::Relaxed), 2);
}

struct PingComputation;

impl VertexComputation<i64, (), i64> for PingComputation {
    fn compute(&mut self, ctx: &mut ComputeContext<'_, i64, (), i64>, messages: MessageIterator<i64>) {
        if ctx.superstep() == 0 {
            ctx.send_message_to_all_neighbours(7);
            ctx.vote_halt();
            return;
        }
        let sum: i64 = messages.sum();
        let updated = ctx.vertex_value() + sum;
        ctx.set_vertex_value(updated);
        ctx.vote_halt();
    }
}

struct PingAlgorithm;

impl Algorithm<i64, (), i64> for PingAlgorithm {
    fn name(&self) -> &str {
        "ping"
    }

    fn message_format(&self) -> Arc<dyn MessageFormat<i64>> {
        Arc::new(JsonFormat::new())
    }

    fn vertex_computation(&self) -> Box<dyn VertexComputation<i64, (), i64>> {
        Box::new(PingComputation)
    }
}

#[tokio::test]
async fn test_liveness_halted_vertex_reactivates_on_message() {
    // a and b live on different workers, so the ping crosses the wire
    let mut graph = InMemoryGraph::new(2, 1);
    graph.add_vertex_to_shard("a", 0, 0);
    graph.add_vertex_to_shard("b", 1, 0);
    graph.add_edge("a", "b", ());

    let algorithm = PingAlgorithm;
    let pool = LocalWorkerPool::new(graph, &algorithm);
    let mut conductor = Conductor::for_algorithm(pool, &algorithm, ConductorConfig::default());
    let report = conductor.run().await.expect("execution completes");

    assert!(!report.halted_by_master, "the run ends by quiescence");
    assert_eq!(
        report.supersteps, 2,
        "the message kept the run alive exactly one extra superstep"
    );

    let pool = conductor.into_channel();
    let values: HashMap<String, i64> = pool
        .vertex_values()
        .await
        .into_iter()
        .map(|(_, key, value)| (key, value))
        .collect();
    assert_eq!(values["b"], 7, "b was recomputed after voting halt");
    assert_eq!(values["a"], 0);
}

// ============================================================
// Compensation
// ============================================================

const RANK_TOTAL: &str = "rank-total";
const REMAINING_RANK: &str = "remaining-rank";
const SCALE: &str = "scale";

struct StaticRankComputation;

impl VertexComputation<f64, (), f64> for StaticRankComputation {
    fn compute(&mut self, ctx: &mut ComputeContext<'_, f64, (), f64>, _messages: MessageIterator<f64>) {
        let rank = *ctx.vertex_value();
        ctx.aggregate(RANK_TOTAL, AggregatorValue::Float(rank));
    }
}

struct StaticRankMaster {
    total_rank: f64,
}

impl MasterContext for StaticRankMaster {
    fn post_global_superstep(&mut self, env: &mut MasterEnv<'_>) -> bool {
        self.total_rank = env.aggregators.get_float(RANK_TOTAL);
        env.superstep < 1
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

struct StaticRankCompensation;

impl VertexCompensation<f64, (), f64> for StaticRankCompensation {
    fn compensate(&mut self, ctx: &mut CompensateContext<'_, f64>, in_lost_partition: bool) {
        if ctx.recovery_step() == 0 {
            if !in_lost_partition {
                ctx.aggregate(REMAINING_RANK, AggregatorValue::Float(*ctx.vertex_value()));
            }
            return;
        }
        if in_lost_partition {
            ctx.set_vertex_value(0.0);
        } else {
            let scaled = *ctx.vertex_value() * ctx.get_aggregated_float(SCALE);
            ctx.set_vertex_value(scaled);
        }
        ctx.vote_active();
    }
}

struct StaticRank;

impl Algorithm<f64, (), f64> for StaticRank {
    fn name(&self) -> &str {
        "staticrank"
    }

    fn message_format(&self) -> Arc<dyn MessageFormat<f64>> {
        Arc::new(JsonFormat::new())
    }

    fn vertex_computation(&self) -> Box<dyn VertexComputation<f64, (), f64>> {
        Box::new(StaticRankComputation)
    }

    fn vertex_compensation(&self) -> Option<Box<dyn VertexCompensation<f64, (), f64>>> {
        Some(Box::new(StaticRankCompensation))
    }

    fn master_context(&self) -> Box<dyn MasterContext> {
        Box::new(StaticRankMaster { total_rank: 0.0 })
    }

    fn aggregators(&self) -> Vec<(String, ValueAggregator)> {
        vec![
            (RANK_TOTAL.to_string(), ValueAggregator::sum_float()),
            (REMAINING_RANK.to_string(), ValueAggregator::sum_float()),
            (SCALE.to_string(), ValueAggregator::overwrite_float(1.0)),
        ]
    }
}

#[tokio::test]
async fn test_safety_compensation_rescales_survivors_exactly_once() {
    // three workers, one shard each; worker 2 will be lost
    let mut graph = InMemoryGraph::new(3, 1);
    graph.add_vertex_to_shard("a", 0, 0.1);
    graph.add_vertex_to_shard("b", 0, 0.2);
    graph.add_vertex_to_shard("c", 1, 0.3);
    graph.add_vertex_to_shard("d", 2, 0.4);

    let algorithm = StaticRank;
    let mut pool = LocalWorkerPool::new(graph, &algorithm);
    pool.fail_worker_at(2, 1);

    let mut conductor = Conductor::for_algorithm(pool, &algorithm, ConductorConfig::default());
    let report = conductor.run().await.expect("recovery lets the run finish");

    assert_eq!(report.recoveries, 1);
    assert!(report.halted_by_master);
    assert_eq!(report.supersteps, 2);

    // totalRank = 1.0 before the loss, survivors hold 0.6, two workers
    // remain, four vertices total after re-homing
    let expected_scale = compensation_scale(1.0, 2, 4, 0.6);
    let values: HashMap<String, f64> = conductor
        .channel_mut()
        .vertex_values()
        .await
        .into_iter()
        .map(|(_, key, value)| (key, value))
        .collect();

    assert!((values["a"] - 0.1 * expected_scale).abs() < 1e-9);
    assert!((values["b"] - 0.2 * expected_scale).abs() < 1e-9);
    assert!((values["c"] - 0.3 * expected_scale).abs() < 1e-9);
    assert_eq!(values["d"], 0.0, "lost-partition vertices reseed the default");
}

#[tokio::test]
async fn test_safety_partition_loss_without_compensation_aborts() {
    let mut graph = InMemoryGraph::new(2, 1);
    graph.add_vertex_to_shard("a", 0, 1);
    graph.add_vertex_to_shard("b", 1, 2);
    graph.add_edge("a", "b", ());
    graph.add_edge("b", "a", ());

    let algorithm = LabelPropagation::new();
    let mut pool = LocalWorkerPool::new(graph, &algorithm);
    pool.fail_worker_at(1, 1);

    let mut conductor = Conductor::for_algorithm(pool, &algorithm, ConductorConfig::default());
    let result = conductor.run().await;
    assert_eq!(result.unwrap_err(), ConductorError::NoCompensation);
}
