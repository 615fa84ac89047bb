// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use pregel_core::{
    ArrayInCache, CombiningInCache, InCache, Inbox, JsonFormat, MessageCombiner, MinCombiner,
    ProtocolError, SumCombiner, WirePacket, ERROR_BAD_PARAMETER,
};
use serde_json::json;
use std::sync::Arc;

fn array_cache(shards: &[u16]) -> ArrayInCache<f64> {
    ArrayInCache::new(shards.iter().copied(), Arc::new(JsonFormat::new()))
}

fn combining_cache(shards: &[u16]) -> CombiningInCache<i64> {
    CombiningInCache::new(
        shards.iter().copied(),
        Arc::new(JsonFormat::new()),
        Arc::new(SumCombiner),
    )
}

// ============================================================
// Count conservation
// ============================================================

#[test]
fn test_safety_count_conservation() {
    let cache = array_cache(&[1, 2]);
    cache.store_message(1, "a", 1.0);
    cache.store_message(1, "a", 2.0);
    cache.store_message(2, "b", 3.0);

    let mut packet = WirePacket::new(2);
    packet.push("c", json!(5.0));
    packet.push_many("d", vec![json!(1.0), json!(2.0)]);
    let stored = cache.parse_messages(&packet).expect("well-formed packet");
    assert_eq!(stored, 3);
    assert_eq!(cache.contained_message_count(), 6);

    // erase removes one entry and decrements once
    let mut section = cache.shard_section(1);
    cache.erase(&mut section, "a");
    drop(section);
    assert_eq!(cache.contained_message_count(), 5);

    // erase of an absent key is not an erase
    let mut section = cache.shard_section(1);
    cache.erase(&mut section, "nope");
    drop(section);
    assert_eq!(cache.contained_message_count(), 5);

    // clear empties storage but never instruments the counter
    cache.clear();
    assert_eq!(
        cache.contained_message_count(),
        5,
        "counter is net additions, clear must not touch it"
    );
    assert!(cache.get_messages(2, "c").is_empty());
}

#[test]
fn test_safety_count_conservation_combining() {
    let cache = combining_cache(&[1]);
    cache.store_message(1, "v", 1);
    cache.store_message(1, "v", 2);
    cache.store_message(1, "w", 5);
    // combining into one slot still counts every stored message
    assert_eq!(cache.contained_message_count(), 3);

    let mut section = cache.shard_section(1);
    cache.erase(&mut section, "v");
    drop(section);
    assert_eq!(cache.contained_message_count(), 2);
}

// ============================================================
// Array mode: ordering and merges
// ============================================================

#[test]
fn test_liveness_array_mode_ordering() {
    let cache = array_cache(&[2]);
    cache.store_message(2, "v2", 1.0);
    cache.store_message(2, "v2", 2.0);

    let messages: Vec<f64> = cache.get_messages(2, "v2").collect();
    assert_eq!(messages, vec![1.0, 2.0], "arrival order must be preserved");
}

#[test]
fn test_liveness_array_merge_appends_in_merge_order() {
    let dest = array_cache(&[1]);
    dest.store_message(1, "k", 1.0);
    dest.store_message(1, "k", 2.0);

    let src = array_cache(&[1]);
    src.store_message(1, "k", 3.0);

    dest.merge_cache(&src);
    let messages: Vec<f64> = dest.get_messages(1, "k").collect();
    assert_eq!(
        messages,
        vec![1.0, 2.0, 3.0],
        "a deterministic merge order concatenates source after destination"
    );
    assert_eq!(dest.contained_message_count(), 3);

    // the source is read, not drained
    let src_messages: Vec<f64> = src.get_messages(1, "k").collect();
    assert_eq!(src_messages, vec![3.0]);
}

#[test]
fn test_safety_merge_disjoint_shards() {
    let a = array_cache(&[1, 2]);
    a.store_message(1, "x", 1.0);

    let b = array_cache(&[1, 2]);
    b.store_message(2, "y", 2.0);

    a.merge_cache(&b);

    let shard1: Vec<f64> = a.get_messages(1, "x").collect();
    let shard2: Vec<f64> = a.get_messages(2, "y").collect();
    assert_eq!(shard1, vec![1.0], "own shard content untouched");
    assert_eq!(shard2, vec![2.0], "merged shard content exactly the source's");
    assert!(a.get_messages(1, "y").is_empty(), "no cross-shard bleed");
    assert!(a.get_messages(2, "x").is_empty(), "no cross-shard bleed");
}

// ============================================================
// Combining mode: order independence
// ============================================================

#[test]
fn test_safety_combining_order_independence() {
    let orders: [[i64; 3]; 3] = [[1, 2, 4], [4, 1, 2], [2, 4, 1]];
    for order in orders {
        let cache = combining_cache(&[1]);
        for value in order {
            cache.store_message(1, "v", value);
        }
        let messages: Vec<i64> = cache.get_messages(1, "v").collect();
        assert_eq!(messages, vec![7], "any insertion order combines to 7");
    }

    // any partition via intermediate caches combines to the same value
    let dest = combining_cache(&[1]);
    dest.store_message(1, "v", 4);

    let src_a = combining_cache(&[1]);
    src_a.store_message(1, "v", 1);
    let src_b = combining_cache(&[1]);
    src_b.store_message(1, "v", 2);

    dest.merge_cache(&src_b);
    dest.merge_cache(&src_a);
    let messages: Vec<i64> = dest.get_messages(1, "v").collect();
    assert_eq!(messages, vec![7]);
}

#[test]
fn test_liveness_combining_min() {
    let cache: CombiningInCache<i64> = CombiningInCache::new(
        [1u16],
        Arc::new(JsonFormat::new()),
        Arc::new(MinCombiner),
    );
    cache.store_message(1, "v", 5);
    cache.store_message(1, "v", 3);
    cache.store_message(1, "v", 9);

    let messages: Vec<i64> = cache.get_messages(1, "v").collect();
    assert_eq!(messages, vec![3]);
}

#[test]
#[should_panic(expected = "not part of this cache")]
fn test_safety_store_to_unknown_shard_panics() {
    let cache = array_cache(&[1]);
    cache.store_message(9, "v", 1.0);
}

#[test]
fn test_liveness_combining_sum() {
    let cache = combining_cache(&[1]);
    cache.store_message(1, "v1", 3);
    cache.store_message(1, "v1", 4);

    let mut messages = cache.get_messages(1, "v1");
    assert_eq!(messages.size(), 1, "combining cache keeps one message per key");
    assert_eq!(messages.next(), Some(7));
    assert_eq!(messages.next(), None);
}

// ============================================================
// Packet parsing
// ============================================================

#[test]
fn test_safety_protocol_error_odd_element_count() {
    let cache = array_cache(&[3]);
    let packet = WirePacket {
        shard: 3,
        entries: vec![json!("k1"), json!(1.0), json!("k2")],
    };

    let err = cache.parse_messages(&packet).unwrap_err();
    match &err {
        ProtocolError::BadParameter(msg) => {
            assert!(msg.contains("3 elements"), "unexpected message: {}", msg)
        }
    }
    assert_eq!(err.code(), ERROR_BAD_PARAMETER);
    assert_eq!(
        cache.contained_message_count(),
        0,
        "a rejected packet stores none of its elements"
    );
    assert!(cache.get_messages(3, "k1").is_empty());
}

#[test]
fn test_safety_protocol_error_non_string_key() {
    let cache = array_cache(&[3]);
    let packet = WirePacket {
        shard: 3,
        entries: vec![json!(1.0), json!(2.0)],
    };
    assert!(cache.parse_messages(&packet).is_err());
    assert_eq!(cache.contained_message_count(), 0);
}

#[test]
fn test_liveness_parse_single_and_array_values() {
    let cache = array_cache(&[7]);
    let mut packet = WirePacket::new(7);
    packet.push("a", json!(1.5));
    packet.push_many("b", vec![json!(2.5), json!(3.5)]);

    let stored = cache.parse_messages(&packet).expect("well-formed packet");
    assert_eq!(stored, 3);

    let a: Vec<f64> = cache.get_messages(7, "a").collect();
    let b: Vec<f64> = cache.get_messages(7, "b").collect();
    assert_eq!(a, vec![1.5]);
    assert_eq!(b, vec![2.5, 3.5]);
}

#[test]
fn test_liveness_store_no_lock_under_one_section() {
    let cache = combining_cache(&[4]);
    let mut section = cache.shard_section(4);
    assert_eq!(section.shard(), 4);
    cache.store_message_no_lock(&mut section, "v", 10);
    cache.store_message_no_lock(&mut section, "v", 5);
    drop(section);

    let messages: Vec<i64> = cache.get_messages(4, "v").collect();
    assert_eq!(messages, vec![15]);
    assert_eq!(cache.contained_message_count(), 2);
}

#[test]
fn test_liveness_for_each_visits_every_message() {
    let cache = array_cache(&[1, 2]);
    cache.store_message(1, "a", 1.0);
    cache.store_message(1, "a", 2.0);
    cache.store_message(2, "b", 3.0);

    let mut seen: Vec<(u16, String, f64)> = Vec::new();
    cache.for_each(&mut |shard, key, message| {
        seen.push((shard, key.to_string(), *message));
    });
    seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(
        seen,
        vec![
            (1, "a".to_string(), 1.0),
            (1, "a".to_string(), 2.0),
            (2, "b".to_string(), 3.0),
        ]
    );
}

// ============================================================
// Inbox shape selection and concurrent merges
// ============================================================

#[test]
fn test_liveness_inbox_selects_shape_by_combiner() {
    let combining: Inbox<i64> = Inbox::new(
        [1u16],
        Arc::new(JsonFormat::new()),
        Some(Arc::new(SumCombiner) as Arc<dyn MessageCombiner<i64>>),
    );
    combining.store_message(1, "v", 3);
    combining.store_message(1, "v", 4);
    let combined: Vec<i64> = combining.get_messages(1, "v").collect();
    assert_eq!(combined, vec![7]);

    let array: Inbox<i64> = Inbox::new([1u16], Arc::new(JsonFormat::new()), None);
    array.store_message(1, "v", 3);
    array.store_message(1, "v", 4);
    let kept: Vec<i64> = array.get_messages(1, "v").collect();
    assert_eq!(kept, vec![3, 4]);
}

#[test]
#[should_panic(expected = "mismatched cache shapes")]
fn test_safety_mismatched_shape_merge_panics() {
    let array: Inbox<i64> = Inbox::new([1u16], Arc::new(JsonFormat::new()), None);
    let combining: Inbox<i64> = Inbox::new(
        [1u16],
        Arc::new(JsonFormat::new()),
        Some(Arc::new(SumCombiner) as Arc<dyn MessageCombiner<i64>>),
    );
    array.merge_cache(&combining);
}

#[test]
fn test_liveness_concurrent_merge_converges() {
    let shards: Vec<u16> = (0..8).collect();
    let dest = combining_cache(&shards);

    let sources: Vec<CombiningInCache<i64>> = (0..4)
        .map(|_| {
            let src = combining_cache(&shards);
            for shard in &shards {
                src.store_message(*shard, &format!("k{}", shard), 1);
            }
            src
        })
        .collect();

    std::thread::scope(|scope| {
        for src in &sources {
            let dest = &dest;
            scope.spawn(move || dest.merge_cache(src));
        }
    });

    for shard in &shards {
        let messages: Vec<i64> = dest.get_messages(*shard, &format!("k{}", shard)).collect();
        assert_eq!(
            messages,
            vec![4],
            "every source's contribution folded exactly once"
        );
    }
    assert_eq!(dest.contained_message_count(), 32);
}
