// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::aggregator_handler::AggregatorHandler;
use crate::types::Superstep;

/// State a worker context hook may inspect and update
pub struct WorkerEnv<'a> {
    pub superstep: Superstep,
    pub vertex_count: u64,
    pub edge_count: u64,
    /// Global values as of the previous superstep (read-only snapshot)
    pub read_aggregators: &'a AggregatorHandler,
    /// This worker's contributions for the current superstep
    pub write_aggregators: &'a mut AggregatorHandler,
}

/// Per-worker lifecycle hooks around each superstep
///
/// All hooks default to no-ops; algorithms override what they need.
pub trait WorkerContext: Send {
    /// One-time setup after the graph is loaded, before superstep 0
    fn pre_application(&mut self, _env: &mut WorkerEnv<'_>) {}

    fn pre_global_superstep(&mut self, _env: &mut WorkerEnv<'_>) {}

    fn post_global_superstep(&mut self, _env: &mut WorkerEnv<'_>) {}

    fn post_application(&mut self, _env: &mut WorkerEnv<'_>) {}
}

/// Context for algorithms that need no worker-side hooks
pub struct NoopWorkerContext;

impl WorkerContext for NoopWorkerContext {}
