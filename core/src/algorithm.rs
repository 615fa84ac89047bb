// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::aggregator::ValueAggregator;
use crate::master_context::{MasterContext, NoopMasterContext};
use crate::message_combiner::MessageCombiner;
use crate::message_format::MessageFormat;
use crate::vertex_computation::{VertexCompensation, VertexComputation};
use crate::worker_context::{NoopWorkerContext, WorkerContext};
use std::sync::Arc;

/// Everything an algorithm registers with the engine
///
/// Implementations are constructed by the client from an opaque
/// user-options document (`serde_json::Value`); the engine never
/// interprets those options.
pub trait Algorithm<V, E, M: Clone + Send>: Send + Sync {
    fn name(&self) -> &str;

    fn message_format(&self) -> Arc<dyn MessageFormat<M>>;

    /// A combiner switches the inbound cache to combining mode
    fn message_combiner(&self) -> Option<Arc<dyn MessageCombiner<M>>> {
        None
    }

    fn vertex_computation(&self) -> Box<dyn VertexComputation<V, E, M>>;

    /// Without a compensation, a partition loss aborts the execution
    fn vertex_compensation(&self) -> Option<Box<dyn VertexCompensation<V, E, M>>> {
        None
    }

    fn worker_context(&self) -> Box<dyn WorkerContext> {
        Box::new(NoopWorkerContext)
    }

    fn master_context(&self) -> Box<dyn MasterContext> {
        Box::new(NoopMasterContext)
    }

    /// Named global reduction values, fixed for the whole execution
    fn aggregators(&self) -> Vec<(String, ValueAggregator)> {
        Vec::new()
    }
}
