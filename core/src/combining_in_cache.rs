// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::error::ProtocolError;
use crate::in_cache::{decode_packet, merge_worklist, InCache};
use crate::message_combiner::MessageCombiner;
use crate::message_format::MessageFormat;
use crate::message_iterator::MessageIterator;
use crate::shard_lock::{ShardGuard, ShardLocks};
use crate::types::ShardId;
use crate::wire::WirePacket;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-key storage of one shard: exactly one combined message
pub type CombiningStore<M> = HashMap<String, M>;

/// Cache folding all messages for a key into one via the combiner
///
/// Correctness requires the combiner to be associative and commutative
/// in practice: for any set of messages destined to the same key the
/// final value must be independent of insertion and merge order. The
/// cache cannot enforce this.
pub struct CombiningInCache<M> {
    format: Arc<dyn MessageFormat<M>>,
    combiner: Arc<dyn MessageCombiner<M>>,
    shards: ShardLocks<CombiningStore<M>>,
    contained: AtomicU64,
}

impl<M: Clone + Send + 'static> CombiningInCache<M> {
    pub fn new(
        shards: impl IntoIterator<Item = ShardId>,
        format: Arc<dyn MessageFormat<M>>,
        combiner: Arc<dyn MessageCombiner<M>>,
    ) -> Self {
        Self {
            format,
            combiner,
            shards: ShardLocks::new(shards),
            contained: AtomicU64::new(0),
        }
    }

    /// Acquire one shard's exclusive section for a no-lock batch
    pub fn shard_section(&self, shard: ShardId) -> ShardGuard<'_, CombiningStore<M>> {
        self.shards.lock(shard)
    }

    /// Insert or combine under a section the caller already holds
    pub fn store_message_no_lock(
        &self,
        section: &mut ShardGuard<'_, CombiningStore<M>>,
        key: &str,
        value: M,
    ) {
        match section.get_mut(key) {
            Some(existing) => self.combiner.combine(existing, &value),
            None => {
                section.insert(key.to_string(), value);
            }
        }
        self.contained.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove one (shard, key) entry under a held section
    pub fn erase(&self, section: &mut ShardGuard<'_, CombiningStore<M>>, key: &str) {
        if section.remove(key).is_some() {
            self.contained.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

impl<M: Clone + Send + 'static> InCache<M> for CombiningInCache<M> {
    fn store_message(&self, shard: ShardId, key: &str, value: M) {
        let mut section = self.shards.lock(shard);
        self.store_message_no_lock(&mut section, key, value);
    }

    fn parse_messages(&self, packet: &WirePacket) -> Result<u64, ProtocolError> {
        let decoded = decode_packet(packet, self.format.as_ref())?;

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
            Some(message) => MessageIterator::new(vec![message.clone()]),
            None => MessageIterator::empty(),
        }
    }

    fn merge_cache(&self, other: &Self) {
        let combiner = Arc::clone(&self.combiner);
        let merged = merge_worklist(&self.shards, &other.shards, |dest, src| {
            let mut moved = 0u64;
            for (key, incoming) in src.iter() {
                moved += 1;
                match dest.get_mut(key) {
                    Some(existing) => combiner.combine(existing, incoming),
                    None => {
                        dest.insert(key.clone(), incoming.clone());
                    }
                }
            }
            moved
        });
        self.contained.fetch_add(merged, Ordering::Relaxed);
    }

    fn clear(&self) {
        self.shards.for_each_locked(|_, store| {
            store.clear();
        });
    }

    fn for_each(&self, visitor: &mut dyn FnMut(ShardId, &str, &M)) {
        self.shards.for_each_locked(|shard, store| {
            for (key, message) in store.iter() {
                visitor(shard, key, message);
            }
        });
    }

    fn contained_message_count(&self) -> u64 {
        self.contained.load(Ordering::Relaxed)
    }
}
