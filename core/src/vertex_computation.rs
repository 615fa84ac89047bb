// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::compute_context::{CompensateContext, ComputeContext};
use crate::message_iterator::MessageIterator;

/// The user-supplied per-vertex step function
///
/// Invoked once per active vertex per superstep. The messages are the
/// ones sent to this vertex during the previous superstep; vertex order
/// within a superstep is unspecified.
pub trait VertexComputation<V, E, M: Clone + Send>: Send {
    fn compute(&mut self, ctx: &mut ComputeContext<'_, V, E, M>, messages: MessageIterator<M>);
}

/// The partition-failure recovery function
///
/// Invoked only during a compensation round, once per vertex on every
/// surviving worker. `in_lost_partition` is true for vertices belonging
/// to a lost worker's original partition membership, which typically
/// reseed a default value while the others apply a scale correction.
/// Call `vote_active` to participate in subsequent normal supersteps.
pub trait VertexCompensation<V, E, M: Clone + Send>: Send {
    fn compensate(&mut self, ctx: &mut CompensateContext<'_, V>, in_lost_partition: bool);
}
