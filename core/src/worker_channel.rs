// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::error::ConductorError;
use crate::message_stats::MessageStats;
use crate::types::{ShardId, Superstep, WorkerId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Conductor → workers: get ready for the next superstep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareSuperstep {
    pub superstep: Superstep,
    /// Global aggregated values as of the previous superstep
    pub aggregator_snapshot: Value,
}

/// Worker → conductor: what one superstep produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuperstepOutcome {
    pub stats: MessageStats,
    pub active_count: u64,
    pub aggregator_values: Value,
}

/// Conductor → workers: run one compensation round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationRound {
    pub recovery_step: u64,
    pub lost_shards: Vec<ShardId>,
    pub aggregator_snapshot: Value,
}

/// Worker → conductor: what one compensation round produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationOutcome {
    pub active_count: u64,
    pub aggregator_values: Value,
}

/// Abstract reliable channel between the conductor and its workers
///
/// Realizations host the workers (in-process tasks, remote processes)
/// and route wire packets between them; a worker that stopped answering
/// surfaces as `ConductorError::WorkerUnreachable`, the condition that
/// triggers the compensation protocol.
#[async_trait]
pub trait WorkerChannel: Send {
    /// Workers currently reachable
    async fn alive_workers(&mut self) -> Vec<WorkerId>;

    /// (vertices, edges) across the reachable workers
    async fn graph_totals(&mut self) -> Result<(u64, u64), ConductorError>;

    /// One-time setup on every worker before superstep 0
    async fn pre_application(&mut self) -> Result<(), ConductorError>;

    /// Ship the superstep number and aggregator snapshot to every worker
    async fn prepare_superstep(&mut self, req: PrepareSuperstep) -> Result<(), ConductorError>;

    /// Run the superstep on every worker, routing the messages they
    /// produce, and gather the outcomes
    async fn run_superstep(&mut self)
        -> Result<Vec<(WorkerId, SuperstepOutcome)>, ConductorError>;

    /// Current traffic deltas since the last report, for draining
    async fn collect_stats(&mut self) -> Result<Vec<(WorkerId, MessageStats)>, ConductorError>;

    /// Re-home lost partitions onto survivors; returns the lost shards
    async fn repair(&mut self) -> Result<Vec<ShardId>, ConductorError>;

    /// Run one compensation round on every surviving worker
    async fn run_compensation(
        &mut self,
        req: CompensationRound,
    ) -> Result<Vec<(WorkerId, CompensationOutcome)>, ConductorError>;

    /// Tear down after the algorithm completes
    async fn finalize(&mut self) -> Result<(), ConductorError>;
}
