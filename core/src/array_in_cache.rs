// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::error::ProtocolError;
use crate::in_cache::{decode_packet, merge_worklist, InCache};
use crate::message_format::MessageFormat;
use crate::message_iterator::MessageIterator;
use crate::shard_lock::{ShardGuard, ShardLocks};
use crate::types::ShardId;
use crate::wire::WirePacket;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-key storage of one shard: messages in arrival order
pub type ArrayStore<M> = HashMap<String, Vec<M>>;

/// Cache keeping every message, ordered by arrival
///
/// Used when the algorithm registers no combiner and the computation
/// needs to see each inbound message individually.
pub struct ArrayInCache<M> {
    format: Arc<dyn MessageFormat<M>>,
    shards: ShardLocks<ArrayStore<M>>,
    contained: AtomicU64,
}

impl<M: Clone + Send + 'static> ArrayInCache<M> {
    pub fn new(
        shards: impl IntoIterator<Item = ShardId>,
        format: Arc<dyn MessageFormat<M>>,
    ) -> Self {
        Self {
            format,
            shards: ShardLocks::new(shards),
            contained: AtomicU64::new(0),
        }
    }

    /// Acquire one shard's exclusive section for a no-lock batch
    pub fn shard_section(&self, shard: ShardId) -> ShardGuard<'_, ArrayStore<M>> {
        self.shards.lock(shard)
    }

    /// Insert under a section the caller already holds
    pub fn store_message_no_lock(
        &self,
        section: &mut ShardGuard<'_, ArrayStore<M>>,
        key: &str,
        value: M,
    ) {
        section.entry(key.to_string()).or_default().push(value);
        self.contained.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove one (shard, key) entry under a held section
    pub fn erase(&self, section: &mut ShardGuard<'_, ArrayStore<M>>, key: &str) {
        if section.remove(key).is_some() {
            self.contained.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

impl<M: Clone + Send + 'static> InCache<M> for ArrayInCache<M> {
    fn store_message(&self, shard: ShardId, key: &str, value: M) {
        let mut section = self.shards.lock(shard);
        self.store_message_no_lock(&mut section, key, value);
    }

    fn parse_messages(&self, packet: &WirePacket) -> Result<u64, ProtocolError> {
        let decoded = decode_packet(packet, self.format.as_ref())?;

        // One acquisition for the whole packet: the payload belongs to a
        // single shard
        let mut section = self.shard_section(packet.shard);
        let mut stored = 0u64;
        for (key, values) in decoded {
            for value in values {
                self.store_message_no_lock(&mut section, &key, value);
                stored += 1;
            }
        }
        Ok(stored)
    }

    fn get_messages(&self, shard: ShardId, key: &str) -> MessageIterator<M> {
        let section = self.shards.lock(shard);
        match section.get(key) {
            Some(messages) => MessageIterator::new(messages.clone()),
            None => MessageIterator::empty(),
        }
    }

    fn merge_cache(&self, other: &Self) {
        let merged = merge_worklist(&self.shards, &other.shards, |dest, src| {
            let mut moved = 0u64;
            for (key, messages) in src.iter() {
                if messages.is_empty() {
                    continue;
                }
                moved += messages.len() as u64;
                dest.entry(key.clone())
                    .or_default()
                    .extend(messages.iter().cloned());
            }
            moved
        });
        self.contained.fetch_add(merged, Ordering::Relaxed);
    }

    fn clear(&self) {
        self.shards.for_each_locked(|_, store| {
            // HashMap::clear keeps the allocation, so pre-sized maps
            // survive across supersteps
            store.clear();
        });
    }

    fn for_each(&self, visitor: &mut dyn FnMut(ShardId, &str, &M)) {
        self.shards.for_each_locked(|shard, store| {
            for (key, messages) in store.iter() {
                for message in messages {
                    visitor(shard, key, message);
                }
            }
        });
    }

    fn contained_message_count(&self) -> u64 {
        self.contained.load(Ordering::Relaxed)
    }
}
