// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::types::ShardId;

/// Where the recovery protocol currently stands
///
/// The protocol is a fixed two-phase sequence: phase 0 tallies the
/// survivors' contribution, phase 1 redistributes the corrective scale
/// and reseeds lost vertices. The state machine makes running the
/// phases out of order unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryPhase {
    Idle,
    TallyingSurvivors,
    Rescaling,
    Done,
}

/// Tracks one recovery: the lost shards and the current phase
#[derive(Debug)]
pub struct Recovery {
    phase: RecoveryPhase,
    lost_shards: Vec<ShardId>,
}

impl Recovery {
    pub fn new() -> Self {
        Self {
            phase: RecoveryPhase::Idle,
            lost_shards: Vec::new(),
        }
    }

    pub fn phase(&self) -> &RecoveryPhase {
        &self.phase
    }

    pub fn lost_shards(&self) -> &[ShardId] {
        &self.lost_shards
    }

    /// A partition loss was detected; start tallying
    pub fn begin(&mut self, lost_shards: Vec<ShardId>) {
        assert!(
            matches!(self.phase, RecoveryPhase::Idle | RecoveryPhase::Done),
            "recovery started while a recovery is already running"
        );
        self.lost_shards = lost_shards;
        self.phase = RecoveryPhase::TallyingSurvivors;
    }

    /// Compensation round index for the current phase
    pub fn recovery_step(&self) -> u64 {
        match self.phase {
            RecoveryPhase::TallyingSurvivors => 0,
            RecoveryPhase::Rescaling => 1,
            _ => panic!("recovery_step read outside a compensation round"),
        }
    }

    /// Advance after a round; `more_rounds` is the master context's
    /// post-compensation answer
    pub fn advance(&mut self, more_rounds: bool) {
        self.phase = match (&self.phase, more_rounds) {
            (RecoveryPhase::TallyingSurvivors, true) => RecoveryPhase::Rescaling,
            (RecoveryPhase::TallyingSurvivors, false) => RecoveryPhase::Done,
            (RecoveryPhase::Rescaling, false) => RecoveryPhase::Done,
            (RecoveryPhase::Rescaling, true) => {
                panic!("compensation is a two-phase protocol, a third round was requested")
            }
            (phase, _) => panic!("recovery advanced from {:?}", phase),
        };
    }

    /// Recovery complete; return to the normal superstep loop
    pub fn finish(&mut self) {
        assert_eq!(
            self.phase,
            RecoveryPhase::Done,
            "recovery finished before reaching Done"
        );
        self.phase = RecoveryPhase::Idle;
        self.lost_shards.clear();
    }

    pub fn is_idle(&self) -> bool {
        self.phase == RecoveryPhase::Idle
    }
}

impl Default for Recovery {
    fn default() -> Self {
        Self::new()
    }
}

/// Corrective factor applied to every surviving vertex's value after a
/// partition loss
///
/// Pure function of the pre-failure total, the number of surviving
/// workers, the surviving vertex count and the total the survivors
/// still hold. Applied exactly once per recovery.
pub fn compensation_scale(
    total_before: f64,
    survivor_count: u64,
    vertex_count: u64,
    remaining: f64,
) -> f64 {
    if vertex_count == 0 || remaining == 0.0 {
        return 1.0;
    }
    total_before * survivor_count as f64 / (vertex_count as f64 * remaining)
}
