// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::array_in_cache::ArrayInCache;
use crate::combining_in_cache::CombiningInCache;
use crate::error::ProtocolError;
use crate::message_combiner::MessageCombiner;
use crate::message_format::MessageFormat;
use crate::message_iterator::MessageIterator;
use crate::types::ShardId;
use crate::wire::WirePacket;
use serde_json::Value;
use std::sync::Arc;

/// Per-worker storage of inbound messages for the next superstep
///
/// Writers (`store_message`, `parse_messages`, `merge_cache`) may run
/// concurrently against different shards; each shard has its own
/// exclusive section. Read-phase operations (`get_messages`, `for_each`,
/// `clear`) are only meaningful after the superstep barrier, when no
/// producer is writing; they take the then-uncontended shard section
/// briefly instead of trusting the caller.
pub trait InCache<M: Clone + Send>: Send + Sync {
    /// Insert one message for (shard, key), locking the shard's section
    fn store_message(&self, shard: ShardId, key: &str, value: M);

    /// Deserialize one shard's wire packet and store every message in it
    ///
    /// Returns the number of messages stored. A malformed packet is
    /// rejected as a whole: nothing is stored and a bad-parameter error
    /// with a fixed code is returned.
    fn parse_messages(&self, packet: &WirePacket) -> Result<u64, ProtocolError>;

    /// Messages currently stored for (shard, key); empty if absent
    fn get_messages(&self, shard: ShardId, key: &str) -> MessageIterator<M>;

    /// Fold a same-shape cache produced by another producer into this one
    ///
    /// Safe to call from several threads merging different sources into
    /// the same destination; see the shuffled try-lock worklist in the
    /// implementations.
    fn merge_cache(&self, other: &Self)
    where
        Self: Sized;

    /// Empty every per-key store while keeping the shard set intact.
    /// Does not touch the contained-message counter.
    fn clear(&self);

    /// Visit every stored message with its (shard, key)
    fn for_each(&self, visitor: &mut dyn FnMut(ShardId, &str, &M));

    /// Net additions: incremented per stored message, decremented per
    /// erased entry, unaffected by `clear`
    fn contained_message_count(&self) -> u64;
}

/// Decode a packet into (key, values) pairs without touching any shard
///
/// Validation happens entirely before storage so that a rejected packet
/// stores none of its elements.
pub(crate) fn decode_packet<M>(
    packet: &WirePacket,
    format: &dyn MessageFormat<M>,
) -> Result<Vec<(String, Vec<M>)>, ProtocolError> {
    if packet.entries.len() % 2 != 0 {
        return Err(ProtocolError::BadParameter(format!(
            "packet for shard {} has {} elements, expected key/value pairs",
            packet.shard,
            packet.entries.len()
        )));
    }

    let mut decoded = Vec::with_capacity(packet.entries.len() / 2);
    for pair in packet.entries.chunks_exact(2) {
        let key = match &pair[0] {
            Value::String(k) => k.clone(),
            other => {
                return Err(ProtocolError::BadParameter(format!(
                    "packet key is not a string: {}",
                    other
                )))
            }
        };
        let values = match &pair[1] {
            Value::Array(items) => items
                .iter()
                .map(|v| format.unwrap_value(v))
                .collect::<Result<Vec<_>, _>>()?,
            single => vec![format.unwrap_value(single)?],
        };
        decoded.push((key, values));
    }
    Ok(decoded)
}

/// Shuffled try-lock worklist driving a cache merge
///
/// Visits shards in randomized order, acquiring both the destination and
/// source sections non-blockingly; shards whose sections are busy are
/// re-queued. Never blocks while holding another section, so two merges
/// running in opposite directions cannot deadlock, and every pass makes
/// progress on whichever shard is currently free. A brief sleep bounds
/// the busy-wait when a full pass over the worklist acquired nothing.
pub(crate) fn merge_worklist<S>(
    dest: &crate::shard_lock::ShardLocks<S>,
    src: &crate::shard_lock::ShardLocks<S>,
    mut merge_one: impl FnMut(&mut S, &S) -> u64,
) -> u64 {
    let mut pending = src.shard_ids();
    fastrand::shuffle(&mut pending);

    let mut merged = 0u64;
    while !pending.is_empty() {
        let mut progressed = false;
        let mut busy = Vec::new();
        for shard in pending.drain(..) {
            assert!(
                dest.contains(shard),
                "merge_cache called with mismatched shard sets"
            );
            match dest.try_lock(shard) {
                Some(mut dest_guard) => match src.try_lock(shard) {
                    Some(src_guard) => {
                        merged += merge_one(&mut *dest_guard, &*src_guard);
                        drop(src_guard);
                        progressed = true;
                    }
                    None => {
                        drop(dest_guard);
                        busy.push(shard);
                    }
                },
                None => busy.push(shard),
            }
        }
        pending = busy;
        if !pending.is_empty() && !progressed {
            std::thread::sleep(std::time::Duration::from_micros(100));
        }
    }
    merged
}

/// Inbound cache selected at construction by combiner availability
pub enum Inbox<M: Clone + Send> {
    Array(ArrayInCache<M>),
    Combining(CombiningInCache<M>),
}

impl<M: Clone + Send + 'static> Inbox<M> {
    /// Build the cache shape the algorithm calls for: combining when a
    /// combiner is registered, ordered arrays otherwise
    pub fn new(
        shards: impl IntoIterator<Item = ShardId>,
        format: Arc<dyn MessageFormat<M>>,
        combiner: Option<Arc<dyn MessageCombiner<M>>>,
    ) -> Self {
        match combiner {
            Some(combiner) => Inbox::Combining(CombiningInCache::new(shards, format, combiner)),
            None => Inbox::Array(ArrayInCache::new(shards, format)),
        }
    }
}

impl<M: Clone + Send + 'static> InCache<M> for Inbox<M> {
    fn store_message(&self, shard: ShardId, key: &str, value: M) {
        match self {
            Inbox::Array(cache) => cache.store_message(shard, key, value),
            Inbox::Combining(cache) => cache.store_message(shard, key, value),
        }
    }

    fn parse_messages(&self, packet: &WirePacket) -> Result<u64, ProtocolError> {
        match self {
            Inbox::Array(cache) => cache.parse_messages(packet),
            Inbox::Combining(cache) => cache.parse_messages(packet),
        }
    }

    fn get_messages(&self, shard: ShardId, key: &str) -> MessageIterator<M> {
        match self {
            Inbox::Array(cache) => cache.get_messages(shard, key),
            Inbox::Combining(cache) => cache.get_messages(shard, key),
        }
    }

    fn merge_cache(&self, other: &Self) {
        match (self, other) {
            (Inbox::Array(dest), Inbox::Array(src)) => dest.merge_cache(src),
            (Inbox::Combining(dest), Inbox::Combining(src)) => dest.merge_cache(src),
            _ => panic!("merge_cache called with mismatched cache shapes"),
        }
    }

    fn clear(&self) {
        match self {
            Inbox::Array(cache) => cache.clear(),
            Inbox::Combining(cache) => cache.clear(),
        }
    }

    fn for_each(&self, visitor: &mut dyn FnMut(ShardId, &str, &M)) {
        match self {
            Inbox::Array(cache) => cache.for_each(visitor),
            Inbox::Combining(cache) => cache.for_each(visitor),
        }
    }

    fn contained_message_count(&self) -> u64 {
        match self {
            Inbox::Array(cache) => cache.contained_message_count(),
            Inbox::Combining(cache) => cache.contained_message_count(),
        }
    }
}
