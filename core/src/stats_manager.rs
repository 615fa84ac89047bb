// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::message_stats::MessageStats;
use crate::types::WorkerId;
use std::collections::HashMap;

/// Tracks per-worker traffic and activity to decide global quiescence
///
/// Two conditions must hold for the computation to terminate: no vertex
/// voted to stay active, and every sent message has been received.
#[derive(Debug, Default)]
pub struct StatsManager {
    message_stats: HashMap<WorkerId, MessageStats>,
    active_counts: HashMap<WorkerId, u64>,
}

impl StatsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one worker's traffic report into its running total
    pub fn accumulate_message_stats(&mut self, worker: WorkerId, stats: &MessageStats) {
        self.message_stats.entry(worker).or_default().accumulate(stats);
    }

    /// Quiescence oracle: every message sent anywhere has been received
    pub fn all_messages_processed(&self) -> bool {
        self.total_send_count() == self.total_received_count()
    }

    pub fn total_send_count(&self) -> u64 {
        self.message_stats.values().map(|s| s.send_count).sum()
    }

    pub fn total_received_count(&self) -> u64 {
        self.message_stats.values().map(|s| s.received_count).sum()
    }

    /// Record how many of a worker's vertices are still active
    pub fn accumulate_active_counts(&mut self, worker: WorkerId, active: u64) {
        self.active_counts.insert(worker, active);
    }

    /// True iff no worker reported an active vertex
    pub fn no_active_vertices(&self) -> bool {
        self.active_counts.values().all(|&count| count == 0)
    }

    pub fn reset_active_count(&mut self) {
        self.active_counts.clear();
    }

    /// Superstep boundary: drop traffic totals for the next round
    pub fn reset(&mut self) {
        self.message_stats.clear();
    }

    /// Accumulated stats per worker, for reporting
    pub fn worker_stats(&self) -> &HashMap<WorkerId, MessageStats> {
        &self.message_stats
    }
}
