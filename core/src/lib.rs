// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

pub mod types;
pub use types::{ShardId, Superstep, WorkerId};

mod error;
pub use error::{ConductorError, ProtocolError, ERROR_BAD_PARAMETER};

mod wire;
pub use wire::WirePacket;

mod message_format;
pub use message_format::{JsonFormat, MessageFormat};

mod message_combiner;
pub use message_combiner::{MessageCombiner, MinCombiner, SumCombiner};

mod message_iterator;
pub use message_iterator::MessageIterator;

mod shard_lock;
pub use shard_lock::{ShardGuard, ShardLocks};

mod in_cache;
pub use in_cache::{InCache, Inbox};

mod array_in_cache;
pub use array_in_cache::{ArrayInCache, ArrayStore};

mod combining_in_cache;
pub use combining_in_cache::{CombiningInCache, CombiningStore};

mod message_stats;
pub use message_stats::MessageStats;

mod stats_manager;
pub use stats_manager::StatsManager;

mod aggregator;
pub use aggregator::{AggregatorKind, AggregatorValue, ValueAggregator};

mod aggregator_handler;
pub use aggregator_handler::AggregatorHandler;

mod graph;
pub use graph::{Edge, ShardAssignment, VertexEntry};

mod worker_context;
pub use worker_context::{NoopWorkerContext, WorkerContext, WorkerEnv};

mod master_context;
pub use master_context::{MasterContext, MasterEnv, NoopMasterContext};

mod compute_context;
pub use compute_context::{CompensateContext, ComputeContext};

mod vertex_computation;
pub use vertex_computation::{VertexCompensation, VertexComputation};

mod out_buffer;
pub use out_buffer::OutBuffer;

mod algorithm;
pub use algorithm::Algorithm;

mod worker_channel;
pub use worker_channel::{
    CompensationOutcome, CompensationRound, PrepareSuperstep, SuperstepOutcome, WorkerChannel,
};

mod worker;
pub use worker::{Worker, DEFAULT_BATCH_SIZE};

mod conductor;
pub use conductor::{Conductor, ConductorConfig, ExecutionReport};

mod recovery;
pub use recovery::{compensation_scale, Recovery, RecoveryPhase};
