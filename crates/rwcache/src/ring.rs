// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Key-to-node dispatch for reads.

use std::{fmt::Debug, sync::Arc};

use xxhash_rust::xxh3::xxh3_64;

/// Chooses the read node responsible for a key.
///
/// For a fixed set of nodes, the same key must always map to the same node.
pub trait Dispatcher<N>: Send + Sync {
    /// Returns the node for `key`, or `None` if there are no nodes.
    fn pick(&self, key: &str) -> Option<&Arc<N>>;
}

const MIN_WEIGHT: u32 = 1;
const MAX_WEIGHT: u32 = 100;

/// A consistent-hash ring over weighted nodes.
///
/// Every node is placed on the ring `replicas * weight / 100` times (at least once); a key
/// belongs to the first virtual node at or after its hash, wrapping around at the end.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use rwcache::{ConsistentHash, Dispatcher};
///
/// let mut ring = ConsistentHash::new(100);
/// ring.add("a", Arc::new("node a"), 100);
/// ring.add("b", Arc::new("node b"), 100);
///
/// let first = ring.pick("user:42").unwrap();
/// assert!(Arc::ptr_eq(first, ring.pick("user:42").unwrap()));
/// ```
pub struct ConsistentHash<N> {
    replicas: usize,
    points: Vec<(u64, usize)>,
    nodes: Vec<(String, Arc<N>)>,
}

impl<N> Debug for ConsistentHash<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistentHash")
            .field("replicas", &self.replicas)
            .field("points", &self.points.len())
            .field("nodes", &self.nodes.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

impl<N> ConsistentHash<N> {
    /// Creates an empty ring placing full-weight nodes `replicas` times.
    #[must_use]
    pub fn new(replicas: usize) -> Self {
        Self {
            replicas: replicas.max(1),
            points: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Adds `node` under `name` with a weight between 1 and 100.
    ///
    /// Adding a name that is already present replaces that node and its weight.
    pub fn add(&mut self, name: impl Into<String>, node: Arc<N>, weight: u32) {
        let name = name.into();
        let index = match self.nodes.iter().position(|(existing, _)| *existing == name) {
            Some(index) => {
                self.points.retain(|(_, owner)| *owner != index);
                self.nodes[index].1 = node;
                index
            }
            None => {
                self.nodes.push((name, node));
                self.nodes.len() - 1
            }
        };

        let name = &self.nodes[index].0;
        for i in 0..self.virtual_nodes(weight) {
            self.points.push((xxh3_64(format!("{name}{i}").as_bytes()), index));
        }
        self.points.sort_unstable();
    }

    /// Returns the number of distinct nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the ring has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<N>> {
        self.nodes.iter().map(|(_, node)| node)
    }

    fn virtual_nodes(&self, weight: u32) -> usize {
        let weight = weight.clamp(MIN_WEIGHT, MAX_WEIGHT) as usize;
        (self.replicas * weight / MAX_WEIGHT as usize).max(1)
    }
}

impl<N: Send + Sync> Dispatcher<N> for ConsistentHash<N> {
    fn pick(&self, key: &str) -> Option<&Arc<N>> {
        if self.points.is_empty() {
            return None;
        }

        let hash = xxh3_64(key.as_bytes());
        let index = self.points.partition_point(|(point, _)| *point < hash) % self.points.len();
        self.nodes.get(self.points[index].1).map(|(_, node)| node)
    }
}
