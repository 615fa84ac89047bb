// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use pregel_core::{
    compensation_scale, AggregatorHandler, AggregatorValue, MessageStats, Recovery, RecoveryPhase,
    StatsManager, ValueAggregator,
};
use serde_json::json;

// ============================================================
// StatsManager: the quiescence oracle
// ============================================================

#[test]
fn test_safety_quiescence_oracle() {
    let mut stats = StatsManager::new();
    assert!(stats.all_messages_processed(), "nothing sent, nothing owed");

    stats.accumulate_message_stats(
        0,
        &MessageStats {
            send_count: 5,
            received_count: 3,
            superstep_runtime_in_seconds: 0.0,
        },
    );
    assert!(
        !stats.all_messages_processed(),
        "sent messages exceed received"
    );

    stats.accumulate_message_stats(
        1,
        &MessageStats {
            send_count: 0,
            received_count: 2,
            superstep_runtime_in_seconds: 0.0,
        },
    );
    assert!(
        stats.all_messages_processed(),
        "totals equal after the drain round"
    );
}

#[test]
fn test_safety_accumulation_is_additive() {
    let mut stats = StatsManager::new();
    let report = MessageStats {
        send_count: 2,
        received_count: 1,
        superstep_runtime_in_seconds: 0.5,
    };
    stats.accumulate_message_stats(3, &report);
    stats.accumulate_message_stats(3, &report);

    assert_eq!(stats.total_send_count(), 4);
    assert_eq!(stats.total_received_count(), 2);
    let per_worker = stats.worker_stats();
    assert_eq!(per_worker[&3].send_count, 4);
    assert!((per_worker[&3].superstep_runtime_in_seconds - 1.0).abs() < 1e-12);

    stats.reset();
    assert_eq!(stats.total_send_count(), 0);
}

#[test]
fn test_liveness_active_vertex_tracking() {
    let mut stats = StatsManager::new();
    assert!(stats.no_active_vertices());

    stats.accumulate_active_counts(0, 2);
    stats.accumulate_active_counts(1, 0);
    assert!(!stats.no_active_vertices());

    stats.reset_active_count();
    assert!(stats.no_active_vertices());

    stats.accumulate_active_counts(0, 0);
    stats.accumulate_active_counts(1, 0);
    assert!(stats.no_active_vertices());
}

#[test]
fn test_liveness_stats_serialization_contract() {
    let stats = MessageStats {
        send_count: 7,
        received_count: 7,
        superstep_runtime_in_seconds: 1.25,
    };
    let document = serde_json::to_value(stats).expect("stats serialize");
    assert_eq!(document["send_count"], json!(7));
    assert_eq!(document["received_count"], json!(7));
    assert_eq!(document["superstep_runtime_in_seconds"], json!(1.25));
}

// ============================================================
// Aggregators
// ============================================================

#[test]
fn test_liveness_aggregator_kinds() {
    let mut max = ValueAggregator::max_float(0.0);
    max.aggregate(&AggregatorValue::Float(1.5));
    max.aggregate(&AggregatorValue::Float(0.5));
    assert_eq!(max.value(), AggregatorValue::Float(1.5));

    let mut sum = ValueAggregator::sum_int();
    sum.aggregate(&AggregatorValue::Int(2));
    sum.aggregate(&AggregatorValue::Int(3));
    assert_eq!(sum.value(), AggregatorValue::Int(5));

    let mut or = ValueAggregator::bool_or();
    or.aggregate(&AggregatorValue::Bool(false));
    assert_eq!(or.value(), AggregatorValue::Bool(false));
    or.aggregate(&AggregatorValue::Bool(true));
    or.aggregate(&AggregatorValue::Bool(false));
    assert_eq!(or.value(), AggregatorValue::Bool(true));

    let mut last = ValueAggregator::overwrite_float(0.0);
    last.aggregate(&AggregatorValue::Float(0.25));
    last.aggregate(&AggregatorValue::Float(0.75));
    assert_eq!(last.value(), AggregatorValue::Float(0.75));
}

#[test]
fn test_safety_aggregator_permanence() {
    let mut permanent = ValueAggregator::overwrite_float(1.0).permanent();
    permanent.aggregate(&AggregatorValue::Float(0.5));
    permanent.reset();
    assert_eq!(
        permanent.value(),
        AggregatorValue::Float(0.5),
        "permanent aggregators keep their value across resets"
    );

    let mut transient = ValueAggregator::sum_float();
    transient.aggregate(&AggregatorValue::Float(2.0));
    transient.reset();
    assert_eq!(
        transient.value(),
        AggregatorValue::Float(0.0),
        "non-permanent aggregators return to their identity"
    );
}

#[test]
#[should_panic(expected = "value type contract violated")]
fn test_safety_aggregate_kind_mismatch_panics() {
    let mut sum = ValueAggregator::sum_float();
    sum.aggregate(&AggregatorValue::Int(1));
}

#[test]
#[should_panic(expected = "value type contract violated")]
fn test_safety_typed_accessor_mismatch_panics() {
    let handler = AggregatorHandler::new(vec![(
        "flag".to_string(),
        ValueAggregator::bool_or(),
    )]);
    handler.get_float("flag");
}

#[test]
fn test_liveness_unknown_name_is_a_noop() {
    let mut handler = AggregatorHandler::empty();
    // logged, ignored, must not panic
    handler.aggregate("unknown", AggregatorValue::Float(1.0));
    assert_eq!(handler.value("unknown"), None);
}

#[test]
fn test_liveness_handler_value_exchange() {
    let registrations = || {
        vec![
            ("total".to_string(), ValueAggregator::sum_float()),
            ("done".to_string(), ValueAggregator::bool_or()),
        ]
    };

    let mut worker_a = AggregatorHandler::new(registrations());
    worker_a.aggregate("total", AggregatorValue::Float(1.5));
    let mut worker_b = AggregatorHandler::new(registrations());
    worker_b.aggregate("total", AggregatorValue::Float(2.5));
    worker_b.aggregate("done", AggregatorValue::Bool(true));

    let mut master = AggregatorHandler::new(registrations());
    master.absorb_values(&worker_a.serialize_values());
    master.absorb_values(&worker_b.serialize_values());
    assert_eq!(master.get_float("total"), 4.0);
    assert!(master.get_bool("done"));

    // a broadcast snapshot overwrites instead of folding
    let mut fresh = AggregatorHandler::new(registrations());
    fresh.set_values(&master.serialize_values());
    assert_eq!(fresh.get_float("total"), 4.0);

    master.reset_values();
    assert_eq!(master.get_float("total"), 0.0);
    assert!(!master.get_bool("done"));
}

// ============================================================
// Recovery state machine
// ============================================================

#[test]
fn test_safety_recovery_two_phase_sequencing() {
    let mut recovery = Recovery::new();
    assert!(recovery.is_idle());

    recovery.begin(vec![2]);
    assert_eq!(*recovery.phase(), RecoveryPhase::TallyingSurvivors);
    assert_eq!(recovery.recovery_step(), 0);
    assert_eq!(recovery.lost_shards(), &[2]);

    recovery.advance(true);
    assert_eq!(*recovery.phase(), RecoveryPhase::Rescaling);
    assert_eq!(recovery.recovery_step(), 1);

    recovery.advance(false);
    assert_eq!(*recovery.phase(), RecoveryPhase::Done);

    recovery.finish();
    assert!(recovery.is_idle());
}

#[test]
#[should_panic(expected = "two-phase protocol")]
fn test_safety_recovery_rejects_third_round() {
    let mut recovery = Recovery::new();
    recovery.begin(vec![1]);
    recovery.advance(true);
    recovery.advance(true);
}

#[test]
#[should_panic(expected = "recovery advanced")]
fn test_safety_recovery_cannot_rescale_before_tallying() {
    let mut recovery = Recovery::new();
    recovery.advance(true);
}

#[test]
fn test_liveness_compensation_scale() {
    let scale = compensation_scale(1.0, 2, 4, 0.6);
    assert!((scale - 1.0 * 2.0 / (4.0 * 0.6)).abs() < 1e-12);

    // degenerate inputs fall back to the identity factor
    assert_eq!(compensation_scale(1.0, 2, 0, 0.5), 1.0);
    assert_eq!(compensation_scale(1.0, 2, 4, 0.0), 1.0);
}
