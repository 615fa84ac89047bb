// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use pregel_core::{
    Algorithm, ComputeContext, JsonFormat, MessageFormat, MessageIterator, VertexComputation,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Community detection by label adoption
///
/// No combiner: the computation needs every inbound label individually
/// to count frequencies, so the engine keeps the array cache. Vertices
/// vote halt once their label is stable and the run ends by quiescence.
pub struct LabelPropagation;

impl LabelPropagation {
    pub fn new() -> Self {
        Self
    }

    pub fn from_params(_params: &Value) -> Self {
        Self::new()
    }
}

impl Default for LabelPropagation {
    fn default() -> Self {
        Self::new()
    }
}

impl Algorithm<i64, (), i64> for LabelPropagation {
    fn name(&self) -> &str {
        "labelpropagation"
    }

    fn message_format(&self) -> Arc<dyn MessageFormat<i64>> {
        Arc::new(JsonFormat::new())
    }

    fn vertex_computation(&self) -> Box<dyn VertexComputation<i64, (), i64>> {
        Box::new(LabelPropagationComputation)
    }
}

struct LabelPropagationComputation;

impl VertexComputation<i64, (), i64> for LabelPropagationComputation {
    fn compute(&mut self, ctx: &mut ComputeContext<'_, i64, (), i64>, messages: MessageIterator<i64>) {
        if ctx.superstep() == 0 {
            let label = *ctx.vertex_value();
            ctx.send_message_to_all_neighbours(label);
            return;
        }

        if messages.is_empty() {
            ctx.vote_halt();
            return;
        }

        let mut frequencies: HashMap<i64, usize> = HashMap::new();
        for label in messages {
            *frequencies.entry(label).or_default() += 1;
        }
        // most frequent label, smallest on a tie
        let best = frequencies
            .into_iter()
            .min_by(|(label_a, count_a), (label_b, count_b)| {
                count_b.cmp(count_a).then(label_a.cmp(label_b))
            })
            .map(|(label, _)| label);
        let Some(best) = best else {
            return;
        };

        if best != *ctx.vertex_value() {
            ctx.set_vertex_value(best);
            ctx.send_message_to_all_neighbours(best);
        } else {
            ctx.vote_halt();
        }
    }
}
