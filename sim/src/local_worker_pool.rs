// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::in_memory_graph::InMemoryGraph;
use async_trait::async_trait;
use pregel_core::{
    Algorithm, CompensationOutcome, CompensationRound, ConductorError, MessageStats,
    PrepareSuperstep, ProtocolError, ShardAssignment, ShardId, Superstep, SuperstepOutcome,
    WirePacket, Worker, WorkerChannel, WorkerId,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// In-process realization of the conductor↔worker channel
///
/// Hosts every worker behind its own async mutex, runs supersteps as
/// concurrent tasks, and routes wire packets (through a serialization
/// round trip) to the owner of each packet's shard. A failed worker
/// stops answering, surfacing as `WorkerUnreachable` on the next call.
pub struct LocalWorkerPool<V, E, M: Clone + Send> {
    workers: HashMap<WorkerId, Arc<Mutex<Worker<V, E, M>>>>,
    assignment: ShardAssignment,
    failed: BTreeSet<WorkerId>,
    fail_at: Option<(WorkerId, Superstep)>,
}

impl<V, E, M> LocalWorkerPool<V, E, M>
where
    V: Send + 'static,
    E: Send + 'static,
    M: Clone + Send + 'static,
{
    pub fn new(graph: InMemoryGraph<V, E>, algorithm: &dyn Algorithm<V, E, M>) -> Self {
        let (assignment, mut by_worker) = graph.into_workers();
        let owners: BTreeSet<WorkerId> = assignment
            .all_shards()
            .into_iter()
            .filter_map(|shard| assignment.owner(shard))
            .collect();

        let workers = owners
            .into_iter()
            .map(|id| {
                let vertices = by_worker.remove(&id).unwrap_or_default();
                let worker = Worker::new(id, assignment.clone(), vertices, algorithm);
                (id, Arc::new(Mutex::new(worker)))
            })
            .collect();

        Self {
            workers,
            assignment,
            failed: BTreeSet::new(),
            fail_at: None,
        }
    }

    /// Simulate an immediate partition loss
    pub fn fail_worker(&mut self, worker: WorkerId) {
        self.failed.insert(worker);
    }

    /// Simulate a partition loss right before the given superstep runs
    pub fn fail_worker_at(&mut self, worker: WorkerId, superstep: Superstep) {
        self.fail_at = Some((worker, superstep));
    }

    fn alive(&self) -> Vec<WorkerId> {
        self.workers
            .keys()
            .copied()
            .filter(|id| !self.failed.contains(id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn first_failed(&self) -> Option<WorkerId> {
        self.failed
            .iter()
            .copied()
            .find(|id| self.workers.contains_key(id))
    }

    async fn totals(&self) -> (u64, u64) {
        let mut vertices = 0;
        let mut edges = 0;
        for id in self.alive() {
            let worker = self.workers[&id].lock().await;
            vertices += worker.local_vertex_count();
            edges += worker.local_edge_count();
        }
        (vertices, edges)
    }

    /// Snapshot of every reachable vertex's value
    pub async fn vertex_values(&self) -> Vec<(ShardId, String, V)>
    where
        V: Clone,
    {
        let mut values = Vec::new();
        for id in self.alive() {
            let worker = self.workers[&id].lock().await;
            values.extend(worker.vertex_values());
        }
        values
    }
}

fn wire_round_trip(packet: &WirePacket) -> Result<WirePacket, ConductorError> {
    let bytes = serde_json::to_vec(packet)
        .map_err(|e| ProtocolError::BadParameter(format!("unencodable packet: {}", e)))?;
    let packet = serde_json::from_slice(&bytes)
        .map_err(|e| ProtocolError::BadParameter(format!("undecodable packet: {}", e)))?;
    Ok(packet)
}

#[async_trait]
impl<V, E, M> WorkerChannel for LocalWorkerPool<V, E, M>
where
    V: Send + 'static,
    E: Send + 'static,
    M: Clone + Send + 'static,
{
    async fn alive_workers(&mut self) -> Vec<WorkerId> {
        self.alive()
    }

    async fn graph_totals(&mut self) -> Result<(u64, u64), ConductorError> {
        Ok(self.totals().await)
    }

    async fn pre_application(&mut self) -> Result<(), ConductorError> {
        let (vertices, edges) = self.totals().await;
        for id in self.alive() {
            self.workers[&id].lock().await.pre_application(vertices, edges);
        }
        Ok(())
    }

    async fn prepare_superstep(&mut self, req: PrepareSuperstep) -> Result<(), ConductorError> {
        if let Some((worker, at)) = self.fail_at {
            if req.superstep >= at && !self.failed.contains(&worker) && self.workers.contains_key(&worker)
            {
                warn!(worker, superstep = req.superstep, "simulated partition loss");
                self.failed.insert(worker);
            }
        }
        if let Some(lost) = self.first_failed() {
            return Err(ConductorError::WorkerUnreachable(lost));
        }
        for id in self.alive() {
            self.workers[&id].lock().await.prepare_superstep(&req);
        }
        Ok(())
    }

    async fn run_superstep(
        &mut self,
    ) -> Result<Vec<(WorkerId, SuperstepOutcome)>, ConductorError> {
        if let Some(lost) = self.first_failed() {
            return Err(ConductorError::WorkerUnreachable(lost));
        }

        let mut handles = Vec::new();
        for id in self.alive() {
            let worker = Arc::clone(&self.workers[&id]);
            handles.push((
                id,
                tokio::spawn(async move { worker.lock().await.process_superstep() }),
            ));
        }

        let mut outcomes = Vec::new();
        let mut pending_packets = Vec::new();
        for (id, handle) in handles {
            match handle.await {
                Ok((outcome, packets)) => {
                    outcomes.push((id, outcome));
                    pending_packets.extend(packets);
                }
                // a crashed worker task is indistinguishable from a lost
                // partition
                Err(_) => return Err(ConductorError::WorkerUnreachable(id)),
            }
        }

        for packet in pending_packets {
            let packet = wire_round_trip(&packet)?;
            let owner = self.assignment.owner(packet.shard).ok_or_else(|| {
                ProtocolError::BadParameter(format!("packet for unassigned shard {}", packet.shard))
            })?;
            if self.failed.contains(&owner) {
                return Err(ConductorError::WorkerUnreachable(owner));
            }
            let worker = self
                .workers
                .get(&owner)
                .ok_or(ConductorError::WorkerUnreachable(owner))?;
            worker
                .lock()
                .await
                .receive_packet(&packet)
                .map_err(ConductorError::Protocol)?;
        }

        outcomes.sort_by_key(|(id, _)| *id);
        Ok(outcomes)
    }

    async fn collect_stats(&mut self) -> Result<Vec<(WorkerId, MessageStats)>, ConductorError> {
        let mut reports = Vec::new();
        for id in self.alive() {
            let stats = self.workers[&id].lock().await.report_stats();
            reports.push((id, stats));
        }
        Ok(reports)
    }

    async fn repair(&mut self) -> Result<Vec<ShardId>, ConductorError> {
        let failed: Vec<WorkerId> = std::mem::take(&mut self.failed).into_iter().collect();
        if failed.is_empty() {
            return Ok(Vec::new());
        }

        let adopter = match self
            .workers
            .keys()
            .copied()
            .filter(|id| !failed.contains(id))
            .min()
        {
            Some(id) => id,
            None => return Err(ConductorError::WorkerUnreachable(failed[0])),
        };

        let mut lost_shards = Vec::new();
        let mut adopted = Vec::new();
        for lost in failed {
            if let Some(worker) = self.workers.remove(&lost) {
                adopted.extend(worker.lock().await.take_vertices());
                lost_shards.extend(self.assignment.reassign(lost, adopter));
            }
        }

        let (vertices, edges) = self.totals().await;
        let adopted_vertices = adopted.len() as u64;
        let adopted_edges: u64 = adopted.iter().map(|v| v.edges.len() as u64).sum();
        let vertices = vertices + adopted_vertices;
        let edges = edges + adopted_edges;

        for (&id, worker) in &self.workers {
            let mut worker = worker.lock().await;
            if id == adopter {
                worker.adopt_shards(
                    self.assignment.clone(),
                    std::mem::take(&mut adopted),
                    vertices,
                    edges,
                );
            } else {
                worker.update_globals(self.assignment.clone(), vertices, edges);
            }
        }

        lost_shards.sort_unstable();
        Ok(lost_shards)
    }

    async fn run_compensation(
        &mut self,
        req: CompensationRound,
    ) -> Result<Vec<(WorkerId, CompensationOutcome)>, ConductorError> {
        if let Some(lost) = self.first_failed() {
            return Err(ConductorError::WorkerUnreachable(lost));
        }
        let mut outcomes = Vec::new();
        for id in self.alive() {
            let outcome = self.workers[&id].lock().await.run_compensation(&req);
            outcomes.push((id, outcome));
        }
        Ok(outcomes)
    }

    async fn finalize(&mut self) -> Result<(), ConductorError> {
        for id in self.alive() {
            self.workers[&id].lock().await.finalize();
        }
        Ok(())
    }
}
