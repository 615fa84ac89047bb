// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::types::ShardId;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};

/// Proof of exclusive access to one shard's storage
///
/// Operations documented as "caller must hold the shard's section" take
/// this guard by argument, so they cannot be called without ownership.
pub struct ShardGuard<'a, S> {
    shard: ShardId,
    inner: MutexGuard<'a, S>,
}

impl<S> ShardGuard<'_, S> {
    pub fn shard(&self) -> ShardId {
        self.shard
    }
}

impl<S> Deref for ShardGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.inner
    }
}

impl<S> DerefMut for ShardGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

/// Fixed map from shard id to its exclusive section and storage
///
/// The shard set is decided at construction and never changes for the
/// lifetime of one execution; per-shard storage is cleared, not torn
/// down, across supersteps.
pub struct ShardLocks<S> {
    sections: HashMap<ShardId, Mutex<S>>,
}

impl<S: Default> ShardLocks<S> {
    pub fn new(shards: impl IntoIterator<Item = ShardId>) -> Self {
        Self {
            sections: shards
                .into_iter()
                .map(|shard| (shard, Mutex::new(S::default())))
                .collect(),
        }
    }
}

impl<S> ShardLocks<S> {
    /// Acquire a shard's section, blocking until it is free
    ///
    /// Panics on a shard outside the constructed set: messages for a
    /// shard this cache does not own are a programming error.
    pub fn lock(&self, shard: ShardId) -> ShardGuard<'_, S> {
        let section = self
            .sections
            .get(&shard)
            .unwrap_or_else(|| panic!("shard {} is not part of this cache", shard));
        ShardGuard {
            shard,
            inner: section.lock().unwrap(),
        }
    }

    /// Non-blocking acquisition; `None` if another thread holds the section
    pub fn try_lock(&self, shard: ShardId) -> Option<ShardGuard<'_, S>> {
        let section = self
            .sections
            .get(&shard)
            .unwrap_or_else(|| panic!("shard {} is not part of this cache", shard));
        section.try_lock().ok().map(|inner| ShardGuard { shard, inner })
    }

    pub fn contains(&self, shard: ShardId) -> bool {
        self.sections.contains_key(&shard)
    }

    pub fn shard_ids(&self) -> Vec<ShardId> {
        self.sections.keys().copied().collect()
    }

    /// Visit every shard's storage, locking each section in turn
    pub fn for_each_locked(&self, mut f: impl FnMut(ShardId, &mut S)) {
        for (shard, section) in &self.sections {
            let mut guard = section.lock().unwrap();
            f(*shard, &mut guard);
        }
    }
}
