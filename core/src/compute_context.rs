// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::aggregator::AggregatorValue;
use crate::aggregator_handler::AggregatorHandler;
use crate::graph::Edge;
use crate::out_buffer::OutBuffer;
use crate::types::{ShardId, Superstep};

/// What one vertex sees and may do during its compute call
///
/// Sends are fire-and-forget: they are buffered and become visible to
/// their destinations only in the next superstep.
pub struct ComputeContext<'a, V, E, M: Clone + Send> {
    pub(crate) superstep: Superstep,
    pub(crate) vertex_count: u64,
    pub(crate) edge_count: u64,
    pub(crate) shard: ShardId,
    pub(crate) key: &'a str,
    pub(crate) value: &'a mut V,
    pub(crate) edges: &'a [Edge<E>],
    pub(crate) active: &'a mut bool,
    pub(crate) out: &'a mut OutBuffer<M>,
    pub(crate) read_aggregators: &'a AggregatorHandler,
    pub(crate) write_aggregators: &'a mut AggregatorHandler,
}

impl<V, E, M: Clone + Send + 'static> ComputeContext<'_, V, E, M> {
    pub fn superstep(&self) -> Superstep {
        self.superstep
    }

    /// Vertices in the whole graph
    pub fn vertex_count(&self) -> u64 {
        self.vertex_count
    }

    /// Edges in the whole graph
    pub fn edge_count(&self) -> u64 {
        self.edge_count
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    pub fn vertex_key(&self) -> &str {
        self.key
    }

    pub fn vertex_value(&self) -> &V {
        self.value
    }

    pub fn vertex_value_mut(&mut self) -> &mut V {
        self.value
    }

    pub fn set_vertex_value(&mut self, value: V) {
        *self.value = value;
    }

    pub fn edges(&self) -> &[Edge<E>] {
        self.edges
    }

    /// Send one message to a specific vertex
    pub fn send_message(&mut self, shard: ShardId, key: &str, value: M) {
        self.out.append(shard, key, value);
    }

    /// Send the same message along every outgoing edge
    pub fn send_message_to_all_neighbours(&mut self, value: M) {
        for edge in self.edges {
            self.out.append(edge.to_shard, &edge.to_key, value.clone());
        }
    }

    /// Fold a contribution into a named global aggregator
    pub fn aggregate(&mut self, name: &str, value: AggregatorValue) {
        self.write_aggregators.aggregate(name, value);
    }

    /// Global aggregated value as of the previous superstep
    pub fn get_aggregated_float(&self, name: &str) -> f64 {
        self.read_aggregators.get_float(name)
    }

    pub fn get_aggregated_int(&self, name: &str) -> i64 {
        self.read_aggregators.get_int(name)
    }

    pub fn get_aggregated_bool(&self, name: &str) -> bool {
        self.read_aggregators.get_bool(name)
    }

    /// Mark this vertex inactive; it still receives messages and is
    /// reactivated automatically when one arrives
    pub fn vote_halt(&mut self) {
        *self.active = false;
    }
}

/// What one vertex sees and may do during a compensation round
pub struct CompensateContext<'a, V> {
    pub(crate) recovery_step: u64,
    pub(crate) vertex_count: u64,
    pub(crate) shard: ShardId,
    pub(crate) key: &'a str,
    pub(crate) value: &'a mut V,
    pub(crate) active: &'a mut bool,
    pub(crate) read_aggregators: &'a AggregatorHandler,
    pub(crate) write_aggregators: &'a mut AggregatorHandler,
}

impl<V> CompensateContext<'_, V> {
    /// Compensation round index {0, 1}
    pub fn recovery_step(&self) -> u64 {
        self.recovery_step
    }

    /// Vertices across the surviving workers
    pub fn vertex_count(&self) -> u64 {
        self.vertex_count
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    pub fn vertex_key(&self) -> &str {
        self.key
    }

    pub fn vertex_value(&self) -> &V {
        self.value
    }

    pub fn set_vertex_value(&mut self, value: V) {
        *self.value = value;
    }

    pub fn aggregate(&mut self, name: &str, value: AggregatorValue) {
        self.write_aggregators.aggregate(name, value);
    }

    pub fn get_aggregated_float(&self, name: &str) -> f64 {
        self.read_aggregators.get_float(name)
    }

    pub fn get_aggregated_bool(&self, name: &str) -> bool {
        self.read_aggregators.get_bool(name)
    }

    /// Rejoin the normal superstep loop after recovery
    pub fn vote_active(&mut self) {
        *self.active = true;
    }
}
