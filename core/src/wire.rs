// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::types::ShardId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One shard's batch of inbound messages on the wire
///
/// `entries` is a flat, positionally-paired list: even-indexed elements
/// are vertex keys (strings), odd-indexed elements are either a single
/// wire value or an array of wire values for that key. An odd total
/// length is a protocol violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePacket {
    pub shard: ShardId,
    pub entries: Vec<Value>,
}

impl WirePacket {
    pub fn new(shard: ShardId) -> Self {
        Self {
            shard,
            entries: Vec::new(),
        }
    }

    /// Append one key with a single wire value
    pub fn push(&mut self, key: &str, value: Value) {
        self.entries.push(Value::String(key.to_string()));
        self.entries.push(value);
    }

    /// Append one key with an array of wire values
    pub fn push_many(&mut self, key: &str, values: Vec<Value>) {
        self.entries.push(Value::String(key.to_string()));
        self.entries.push(Value::Array(values));
    }

    /// Number of wire values in the packet, counting array elements
    pub fn message_count(&self) -> u64 {
        self.entries
            .iter()
            .skip(1)
            .step_by(2)
            .map(|v| match v {
                Value::Array(a) => a.len() as u64,
                _ => 1,
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
