// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

/// Opaque identifier of a disjoint vertex partition owned by one worker
pub type ShardId = u16;

/// Identity of a worker within one execution
pub type WorkerId = usize;

/// Global superstep counter, owned by the conductor
pub type Superstep = u64;
