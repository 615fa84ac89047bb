// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use serde::{Deserialize, Serialize};

/// Per-worker message traffic counters for one superstep
///
/// The field names are a serialization contract consumed by external
/// monitoring; do not rename them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageStats {
    pub send_count: u64,
    pub received_count: u64,
    pub superstep_runtime_in_seconds: f64,
}

impl MessageStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold another report into this one (additive)
    pub fn accumulate(&mut self, other: &MessageStats) {
        self.send_count += other.send_count;
        self.received_count += other.received_count;
        self.superstep_runtime_in_seconds += other.superstep_runtime_in_seconds;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
