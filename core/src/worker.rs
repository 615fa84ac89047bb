// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::algorithm::Algorithm;
use crate::aggregator_handler::AggregatorHandler;
use crate::compute_context::{CompensateContext, ComputeContext};
use crate::error::ProtocolError;
use crate::graph::{ShardAssignment, VertexEntry};
use crate::in_cache::{InCache, Inbox};
use crate::message_combiner::MessageCombiner;
use crate::message_format::MessageFormat;
use crate::message_stats::MessageStats;
use crate::out_buffer::OutBuffer;
use crate::types::{ShardId, Superstep, WorkerId};
use crate::vertex_computation::{VertexCompensation, VertexComputation};
use crate::wire::WirePacket;
use crate::worker_channel::{
    CompensationOutcome, CompensationRound, PrepareSuperstep, SuperstepOutcome,
};
use crate::worker_context::{WorkerContext, WorkerEnv};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Remote batch size past which a shard's pending messages are
/// packetized mid-superstep
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// One worker's engine state for the lifetime of an execution
///
/// Owns the double-buffered inbound caches (messages for the current
/// superstep are read from one while the next superstep's arrive in the
/// other), the outbound buffer, and the per-worker aggregator handlers.
pub struct Worker<V, E, M: Clone + Send> {
    worker_id: WorkerId,
    assignment: ShardAssignment,
    vertices: HashMap<ShardId, Vec<VertexEntry<V, E>>>,
    format: Arc<dyn MessageFormat<M>>,
    combiner: Option<Arc<dyn MessageCombiner<M>>>,
    read_cache: Inbox<M>,
    write_cache: Inbox<M>,
    out: OutBuffer<M>,
    computation: Box<dyn VertexComputation<V, E, M>>,
    compensation: Option<Box<dyn VertexCompensation<V, E, M>>>,
    context: Box<dyn WorkerContext>,
    read_aggregators: AggregatorHandler,
    write_aggregators: AggregatorHandler,
    superstep: Superstep,
    global_vertex_count: u64,
    global_edge_count: u64,
    unreported_received: u64,
}

impl<V, E, M> Worker<V, E, M>
where
    V: Send + 'static,
    E: Send + 'static,
    M: Clone + Send + 'static,
{
    pub fn new(
        worker_id: WorkerId,
        assignment: ShardAssignment,
        vertices: Vec<VertexEntry<V, E>>,
        algorithm: &dyn Algorithm<V, E, M>,
    ) -> Self {
        let local_shards = assignment.shards_of(worker_id);
        let format = algorithm.message_format();
        let combiner = algorithm.message_combiner();

        let mut by_shard: HashMap<ShardId, Vec<VertexEntry<V, E>>> = HashMap::new();
        for shard in &local_shards {
            by_shard.insert(*shard, Vec::new());
        }
        for entry in vertices {
            by_shard.entry(entry.shard).or_default().push(entry);
        }

        let read_cache = Inbox::new(
            local_shards.iter().copied(),
            Arc::clone(&format),
            combiner.clone(),
        );
        let write_cache = Inbox::new(
            local_shards.iter().copied(),
            Arc::clone(&format),
            combiner.clone(),
        );
        let out = OutBuffer::new(
            local_shards.iter().copied(),
            Arc::clone(&format),
            combiner.clone(),
            DEFAULT_BATCH_SIZE,
        );

        Self {
            worker_id,
            assignment,
            vertices: by_shard,
            format,
            combiner,
            read_cache,
            write_cache,
            out,
            computation: algorithm.vertex_computation(),
            compensation: algorithm.vertex_compensation(),
            context: algorithm.worker_context(),
            read_aggregators: AggregatorHandler::new(algorithm.aggregators()),
            write_aggregators: AggregatorHandler::new(algorithm.aggregators()),
            superstep: 0,
            global_vertex_count: 0,
            global_edge_count: 0,
            unreported_received: 0,
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn local_vertex_count(&self) -> u64 {
        self.vertices.values().map(|v| v.len() as u64).sum()
    }

    pub fn local_edge_count(&self) -> u64 {
        self.vertices
            .values()
            .flat_map(|entries| entries.iter())
            .map(|entry| entry.edges.len() as u64)
            .sum()
    }

    pub fn count_active(&self) -> u64 {
        self.vertices
            .values()
            .flat_map(|entries| entries.iter())
            .filter(|entry| entry.active)
            .count() as u64
    }

    /// One-time setup once the global graph size is known
    pub fn pre_application(&mut self, vertex_count: u64, edge_count: u64) {
        self.global_vertex_count = vertex_count;
        self.global_edge_count = edge_count;
        let Self {
            context,
            read_aggregators,
            write_aggregators,
            ..
        } = self;
        let mut env = WorkerEnv {
            superstep: 0,
            vertex_count,
            edge_count,
            read_aggregators,
            write_aggregators,
        };
        context.pre_application(&mut env);
    }

    /// Store one inbound packet for the next superstep
    pub fn receive_packet(&mut self, packet: &WirePacket) -> Result<u64, ProtocolError> {
        let stored = self.write_cache.parse_messages(packet)?;
        self.unreported_received += stored;
        Ok(stored)
    }

    /// Superstep boundary: swap the double-buffered caches and absorb
    /// the conductor's aggregator snapshot
    pub fn prepare_superstep(&mut self, req: &PrepareSuperstep) {
        self.superstep = req.superstep;
        std::mem::swap(&mut self.read_cache, &mut self.write_cache);
        self.write_cache.clear();
        self.read_aggregators.set_values(&req.aggregator_snapshot);
        self.write_aggregators.reset_values();

        let Self {
            context,
            read_aggregators,
            write_aggregators,
            superstep,
            global_vertex_count,
            global_edge_count,
            ..
        } = self;
        let mut env = WorkerEnv {
            superstep: *superstep,
            vertex_count: *global_vertex_count,
            edge_count: *global_edge_count,
            read_aggregators,
            write_aggregators,
        };
        context.pre_global_superstep(&mut env);
    }

    /// Run the computation over every active vertex, flush the outbound
    /// buffer, and report the outcome plus the packets to deliver
    pub fn process_superstep(&mut self) -> (SuperstepOutcome, Vec<WirePacket>) {
        let started = Instant::now();

        let Self {
            vertices,
            read_cache,
            out,
            computation,
            read_aggregators,
            write_aggregators,
            superstep,
            global_vertex_count,
            global_edge_count,
            ..
        } = self;

        let mut computed = 0u64;
        for (shard, entries) in vertices.iter_mut() {
            for entry in entries.iter_mut() {
                let messages = read_cache.get_messages(*shard, &entry.key);
                if !entry.active && messages.is_empty() {
                    continue;
                }
                // an inbound message reactivates a halted vertex
                entry.active = true;
                computed += 1;

                let VertexEntry {
                    key,
                    value,
                    edges,
                    active,
                    ..
                } = entry;
                let mut ctx = ComputeContext {
                    superstep: *superstep,
                    vertex_count: *global_vertex_count,
                    edge_count: *global_edge_count,
                    shard: *shard,
                    key: key.as_str(),
                    value,
                    edges: edges.as_slice(),
                    active,
                    out: &mut *out,
                    read_aggregators: &*read_aggregators,
                    write_aggregators: &mut *write_aggregators,
                };
                computation.compute(&mut ctx, messages);
            }
        }

        // local messages become next-superstep input through the same
        // merge path remote senders use
        self.write_cache.merge_cache(self.out.staging());
        self.out.clear_staging();
        let packets = self.out.flush();
        let (sent_local, sent_remote) = self.out.take_send_counts();
        self.unreported_received += sent_local;

        let active_count = self.count_active();
        debug!(
            worker = self.worker_id,
            superstep = self.superstep,
            computed,
            active = active_count,
            sent = sent_local + sent_remote,
            "superstep processed"
        );

        let Self {
            context,
            read_aggregators,
            write_aggregators,
            ..
        } = self;
        let mut env = WorkerEnv {
            superstep: self.superstep,
            vertex_count: self.global_vertex_count,
            edge_count: self.global_edge_count,
            read_aggregators,
            write_aggregators,
        };
        context.post_global_superstep(&mut env);

        let stats = MessageStats {
            send_count: sent_local + sent_remote,
            received_count: std::mem::take(&mut self.unreported_received),
            superstep_runtime_in_seconds: started.elapsed().as_secs_f64(),
        };
        let outcome = SuperstepOutcome {
            stats,
            active_count,
            aggregator_values: self.write_aggregators.serialize_values(),
        };
        (outcome, packets)
    }

    /// Traffic received since the last report, for the conductor's
    /// drain loop
    pub fn report_stats(&mut self) -> MessageStats {
        MessageStats {
            send_count: 0,
            received_count: std::mem::take(&mut self.unreported_received),
            superstep_runtime_in_seconds: 0.0,
        }
    }

    /// Run one compensation round over every local vertex
    pub fn run_compensation(&mut self, req: &CompensationRound) -> CompensationOutcome {
        self.read_aggregators.set_values(&req.aggregator_snapshot);
        self.write_aggregators.reset_values();

        let lost: HashSet<ShardId> = req.lost_shards.iter().copied().collect();
        let Self {
            vertices,
            compensation,
            read_aggregators,
            write_aggregators,
            global_vertex_count,
            ..
        } = self;

        if let Some(compensation) = compensation {
            for (shard, entries) in vertices.iter_mut() {
                let in_lost = lost.contains(shard);
                for entry in entries.iter_mut() {
                    let VertexEntry {
                        key, value, active, ..
                    } = entry;
                    let mut ctx = CompensateContext {
                        recovery_step: req.recovery_step,
                        vertex_count: *global_vertex_count,
                        shard: *shard,
                        key: key.as_str(),
                        value,
                        active,
                        read_aggregators: &*read_aggregators,
                        write_aggregators: &mut *write_aggregators,
                    };
                    compensation.compensate(&mut ctx, in_lost);
                }
            }
        }

        debug!(
            worker = self.worker_id,
            recovery_step = req.recovery_step,
            "compensation round processed"
        );

        CompensationOutcome {
            active_count: self.count_active(),
            aggregator_values: self.write_aggregators.serialize_values(),
        }
    }

    /// Take over shards from a lost worker: extend the vertex set and
    /// rebuild the caches for the new shard set (pending messages for
    /// the old set are gone with the failed worker)
    pub fn adopt_shards(
        &mut self,
        assignment: ShardAssignment,
        adopted: Vec<VertexEntry<V, E>>,
        vertex_count: u64,
        edge_count: u64,
    ) {
        self.assignment = assignment;
        self.global_vertex_count = vertex_count;
        self.global_edge_count = edge_count;
        for entry in adopted {
            self.vertices.entry(entry.shard).or_default().push(entry);
        }

        let local_shards = self.assignment.shards_of(self.worker_id);
        for shard in &local_shards {
            self.vertices.entry(*shard).or_default();
        }
        self.read_cache = Inbox::new(
            local_shards.iter().copied(),
            Arc::clone(&self.format),
            self.combiner.clone(),
        );
        self.write_cache = Inbox::new(
            local_shards.iter().copied(),
            Arc::clone(&self.format),
            self.combiner.clone(),
        );
        self.out = OutBuffer::new(
            local_shards,
            Arc::clone(&self.format),
            self.combiner.clone(),
            DEFAULT_BATCH_SIZE,
        );
    }

    /// A partition was lost elsewhere: adopt the new assignment and
    /// graph totals. Messages in flight at the loss are gone, so both
    /// buffers restart empty.
    pub fn update_globals(
        &mut self,
        assignment: ShardAssignment,
        vertex_count: u64,
        edge_count: u64,
    ) {
        self.assignment = assignment;
        self.global_vertex_count = vertex_count;
        self.global_edge_count = edge_count;
        self.read_cache.clear();
        self.write_cache.clear();
    }

    /// Algorithm complete: final hook, caches emptied but kept alive
    pub fn finalize(&mut self) {
        let Self {
            context,
            read_aggregators,
            write_aggregators,
            superstep,
            global_vertex_count,
            global_edge_count,
            ..
        } = self;
        let mut env = WorkerEnv {
            superstep: *superstep,
            vertex_count: *global_vertex_count,
            edge_count: *global_edge_count,
            read_aggregators,
            write_aggregators,
        };
        context.post_application(&mut env);
        self.read_cache.clear();
        self.write_cache.clear();
    }

    /// Snapshot of every local vertex's value
    pub fn vertex_values(&self) -> Vec<(ShardId, String, V)>
    where
        V: Clone,
    {
        self.vertices
            .values()
            .flat_map(|entries| entries.iter())
            .map(|entry| (entry.shard, entry.key.clone(), entry.value.clone()))
            .collect()
    }

    /// Remove and return every local vertex, for re-homing after a loss
    pub fn take_vertices(&mut self) -> Vec<VertexEntry<V, E>> {
        self.vertices.drain().flat_map(|(_, entries)| entries).collect()
    }
}
