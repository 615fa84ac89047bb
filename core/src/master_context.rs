// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::aggregator_handler::AggregatorHandler;
use crate::types::Superstep;

/// State a master context hook may inspect and update
pub struct MasterEnv<'a> {
    pub superstep: Superstep,
    pub vertex_count: u64,
    pub edge_count: u64,
    /// Workers currently reachable
    pub worker_count: u64,
    /// Compensation round index {0, 1}; 0 outside recovery
    pub recovery_step: u64,
    /// The merged global aggregators for this superstep
    pub aggregators: &'a mut AggregatorHandler,
}

/// Single global lifecycle hooks, driven once per superstep
pub trait MasterContext: Send {
    /// One-time setup before superstep 0
    fn pre_application(&mut self, _env: &mut MasterEnv<'_>) {}

    fn pre_global_superstep(&mut self, _env: &mut MasterEnv<'_>) {}

    /// Inspect the aggregated values and decide whether to continue.
    /// Returning false halts the whole computation.
    fn post_global_superstep(&mut self, _env: &mut MasterEnv<'_>) -> bool {
        true
    }

    /// Entered only when a partition was lost, before a compensation
    /// round runs. Returning false skips the round.
    fn pre_compensation(&mut self, _env: &mut MasterEnv<'_>) -> bool {
        true
    }

    /// After a compensation round; returning true requests one more
    /// round (the protocol is a fixed two-phase sequence: tally the
    /// survivors' contribution, then redistribute the corrective scale)
    fn post_compensation(&mut self, _env: &mut MasterEnv<'_>) -> bool {
        false
    }

    fn post_application(&mut self, _env: &mut MasterEnv<'_>) {}
}

/// Context for algorithms that need no master-side hooks
pub struct NoopMasterContext;

impl MasterContext for NoopMasterContext {}
