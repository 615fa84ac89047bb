// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use std::ops::AddAssign;

/// Associative reduction of two messages addressed to the same vertex
///
/// The engine relies on (but cannot verify) associativity and practical
/// commutativity: for messages {m1, m2, m3} the combined result must not
/// depend on insertion or merge order. Must be total over the message
/// value's legal range.
pub trait MessageCombiner<M>: Send + Sync {
    fn combine(&self, existing: &mut M, incoming: &M);
}

/// Adds incoming messages together
pub struct SumCombiner;

impl<M> MessageCombiner<M> for SumCombiner
where
    M: AddAssign + Copy + Send + Sync,
{
    fn combine(&self, existing: &mut M, incoming: &M) {
        *existing += *incoming;
    }
}

/// Keeps the smaller of the two messages
pub struct MinCombiner;

impl<M> MessageCombiner<M> for MinCombiner
where
    M: PartialOrd + Copy + Send + Sync,
{
    fn combine(&self, existing: &mut M, incoming: &M) {
        if *incoming < *existing {
            *existing = *incoming;
        }
    }
}
