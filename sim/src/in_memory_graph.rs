// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use pregel_core::{Edge, ShardAssignment, ShardId, VertexEntry, WorkerId};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Shard-partitioned vertex/edge construction for the local worker pool
///
/// Shards are distributed round-robin over the workers; vertices land on
/// a shard either by key hash or explicitly.
pub struct InMemoryGraph<V, E> {
    total_shards: u16,
    assignment: ShardAssignment,
    vertices: HashMap<String, VertexEntry<V, E>>,
}

impl<V, E> InMemoryGraph<V, E> {
    pub fn new(worker_count: usize, shards_per_worker: usize) -> Self {
        let total_shards = (worker_count * shards_per_worker) as u16;
        let assignment = ShardAssignment::new(
            (0..total_shards).map(|shard| (shard, shard as usize % worker_count)),
        );
        Self {
            total_shards,
            assignment,
            vertices: HashMap::new(),
        }
    }

    /// Shard a key hashes onto
    pub fn shard_of(&self, key: &str) -> ShardId {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.total_shards as u64) as ShardId
    }

    pub fn add_vertex(&mut self, key: &str, value: V) {
        let shard = self.shard_of(key);
        self.add_vertex_to_shard(key, shard, value);
    }

    /// Place a vertex on a specific shard (deterministic layouts)
    pub fn add_vertex_to_shard(&mut self, key: &str, shard: ShardId, value: V) {
        assert!(shard < self.total_shards, "shard {} does not exist", shard);
        self.vertices
            .insert(key.to_string(), VertexEntry::new(shard, key, value, Vec::new()));
    }

    /// Directed edge; add both directions for an undirected graph
    pub fn add_edge(&mut self, from: &str, to: &str, data: E) {
        let to_shard = match self.vertices.get(to) {
            Some(entry) => entry.shard,
            None => self.shard_of(to),
        };
        let entry = self
            .vertices
            .get_mut(from)
            .unwrap_or_else(|| panic!("edge from unknown vertex '{}'", from));
        entry.edges.push(Edge {
            to_shard,
            to_key: to.to_string(),
            data,
        });
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Tear down into the per-worker vertex sets the pool needs
    pub fn into_workers(self) -> (ShardAssignment, HashMap<WorkerId, Vec<VertexEntry<V, E>>>) {
        let Self {
            assignment,
            vertices,
            ..
        } = self;
        let mut by_worker: HashMap<WorkerId, Vec<VertexEntry<V, E>>> = HashMap::new();
        for (_, entry) in vertices {
            let owner = assignment
                .owner(entry.shard)
                .expect("every shard has an owner");
            by_worker.entry(owner).or_default().push(entry);
        }
        (assignment, by_worker)
    }
}
