// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::in_cache::{InCache, Inbox};
use crate::message_combiner::MessageCombiner;
use crate::message_format::MessageFormat;
use crate::types::ShardId;
use crate::wire::WirePacket;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Messages per remote shard awaiting packetization
enum RemotePending<M> {
    /// Pre-combined per key, one slot per destination vertex
    Combined {
        combiner: Arc<dyn MessageCombiner<M>>,
        shards: HashMap<ShardId, HashMap<String, M>>,
    },
    /// Kept in send order
    Ordered(HashMap<ShardId, Vec<(String, M)>>),
}

/// Send-side buffer: messages produced during a superstep, visible to
/// their destinations only in the next one
///
/// Local-shard messages are staged in a private inbox and merged into
/// the worker's own write cache at flush; remote-shard messages are
/// batched per destination shard and packetized, mid-superstep once a
/// batch exceeds `batch_size`, the rest at flush.
pub struct OutBuffer<M: Clone + Send> {
    format: Arc<dyn MessageFormat<M>>,
    local_shards: HashSet<ShardId>,
    staging: Inbox<M>,
    remote: RemotePending<M>,
    ready: Vec<WirePacket>,
    batch_size: usize,
    sent_local: u64,
    sent_remote: u64,
}

impl<M: Clone + Send + 'static> OutBuffer<M> {
    pub fn new(
        local_shards: impl IntoIterator<Item = ShardId>,
        format: Arc<dyn MessageFormat<M>>,
        combiner: Option<Arc<dyn MessageCombiner<M>>>,
        batch_size: usize,
    ) -> Self {
        let local_shards: HashSet<ShardId> = local_shards.into_iter().collect();
        let staging = Inbox::new(
            local_shards.iter().copied(),
            Arc::clone(&format),
            combiner.clone(),
        );
        let remote = match combiner {
            Some(combiner) => RemotePending::Combined {
                combiner,
                shards: HashMap::new(),
            },
            None => RemotePending::Ordered(HashMap::new()),
        };
        Self {
            format,
            local_shards,
            staging,
            remote,
            ready: Vec::new(),
            batch_size,
            sent_local: 0,
            sent_remote: 0,
        }
    }

    /// Buffer one message for (shard, key)
    pub fn append(&mut self, shard: ShardId, key: &str, value: M) {
        if self.local_shards.contains(&shard) {
            self.staging.store_message(shard, key, value);
            self.sent_local += 1;
            return;
        }

        let pending_len = match &mut self.remote {
            RemotePending::Combined { combiner, shards } => {
                let slots = shards.entry(shard).or_default();
                match slots.get_mut(key) {
                    Some(existing) => combiner.combine(existing, &value),
                    None => {
                        slots.insert(key.to_string(), value);
                    }
                }
                slots.len()
            }
            RemotePending::Ordered(shards) => {
                let batch = shards.entry(shard).or_default();
                batch.push((key.to_string(), value));
                batch.len()
            }
        };

        if pending_len >= self.batch_size {
            self.packetize(shard);
        }
    }

    /// Turn one remote shard's pending batch into a wire packet
    fn packetize(&mut self, shard: ShardId) {
        let Self {
            format,
            remote,
            ready,
            sent_remote,
            ..
        } = self;

        let mut packet = WirePacket::new(shard);
        match remote {
            RemotePending::Combined { shards, .. } => {
                let Some(slots) = shards.get_mut(&shard) else {
                    return;
                };
                for (key, value) in slots.drain() {
                    packet.push(&key, format.wrap_value(&value));
                }
            }
            RemotePending::Ordered(shards) => {
                let Some(batch) = shards.get_mut(&shard) else {
                    return;
                };
                // group per key, preserving each key's send order
                let mut grouped: HashMap<String, Vec<serde_json::Value>> = HashMap::new();
                for (key, value) in batch.drain(..) {
                    grouped
                        .entry(key)
                        .or_default()
                        .push(format.wrap_value(&value));
                }
                for (key, values) in grouped {
                    packet.push_many(&key, values);
                }
            }
        }
        if !packet.is_empty() {
            *sent_remote += packet.message_count();
            ready.push(packet);
        }
    }

    /// End of the superstep: packetize everything still pending and
    /// hand the packets over for delivery
    pub fn flush(&mut self) -> Vec<WirePacket> {
        let shards: Vec<ShardId> = match &self.remote {
            RemotePending::Combined { shards, .. } => shards.keys().copied().collect(),
            RemotePending::Ordered(shards) => shards.keys().copied().collect(),
        };
        for shard in shards {
            self.packetize(shard);
        }
        std::mem::take(&mut self.ready)
    }

    /// The staged local messages, to be merged into the write cache
    pub fn staging(&self) -> &Inbox<M> {
        &self.staging
    }

    pub fn clear_staging(&mut self) {
        self.staging.clear();
    }

    /// Messages sent this superstep (local, remote), resetting both
    pub fn take_send_counts(&mut self) -> (u64, u64) {
        let counts = (self.sent_local, self.sent_remote);
        self.sent_local = 0;
        self.sent_remote = 0;
        counts
    }
}
