// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock store implementation for testing.
//!
//! This module provides `MockStore`, a [`MemoryStore`] that records every operation and
//! supports failure injection for exercising error paths.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::{Error, MemoryStore, Store, Topology};

/// Recorded store operation with full context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// A get operation was performed with the given key.
    Get(String),
    /// A write was performed.
    Set {
        /// The key that was written.
        key: String,
        /// The payload that was written.
        value: Bytes,
        /// The requested expiry.
        expire: Duration,
    },
    /// A delete operation was performed with the given keys.
    Delete(Vec<String>),
}

type FailPredicate = Box<dyn Fn(&StoreOp) -> bool + Send + Sync>;

/// A configurable mock store for testing.
///
/// Stores values in memory exactly like [`MemoryStore`] and can be told to fail operations
/// on demand. Failed operations are recorded too, so tests can verify that a call was
/// attempted. Clones share data, recorded operations and the failure predicate.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use bytes::Bytes;
/// use rwcache_store::{Store, testing::{MockStore, StoreOp}};
/// # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
///
/// let store = MockStore::new("mock");
/// store.fail_when(|op| matches!(op, StoreOp::Get(key) if key == "down"));
///
/// assert!(store.get("down").await.is_err());
/// assert!(store.get("up").await.is_ok());
/// assert_eq!(store.operations().len(), 2);
/// # });
/// ```
#[derive(Clone)]
pub struct MockStore {
    data: MemoryStore,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    fail_when: Arc<Mutex<Option<FailPredicate>>>,
}

impl std::fmt::Debug for MockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStore")
            .field("data", &self.data)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish()
    }
}

impl MockStore {
    /// Creates an empty mock store reporting the given address.
    #[must_use]
    pub fn new(addr: impl Into<Arc<str>>) -> Self {
        Self {
            data: MemoryStore::new(addr),
            operations: Arc::default(),
            fail_when: Arc::default(),
        }
    }

    /// Creates an empty mock store that reports a cluster topology.
    #[must_use]
    pub fn cluster(addr: impl Into<Arc<str>>) -> Self {
        Self {
            data: MemoryStore::new(addr).with_topology(Topology::Cluster),
            ..Self::new("")
        }
    }

    /// Sets a predicate that decides which operations fail.
    ///
    /// Replaces any predicate set before.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&StoreOp) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate, allowing all operations to succeed.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().clone()
    }

    /// Returns how many recorded operations match `predicate`.
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&StoreOp) -> bool) -> usize {
        self.operations.lock().iter().filter(|op| predicate(op)).count()
    }

    /// Clears all recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    /// Writes a raw payload without recording an operation.
    pub fn insert_raw(&self, key: &str, value: impl Into<Bytes>, expire: Duration) {
        self.data.write(key, value.into(), expire);
    }

    /// Reads a raw payload without recording an operation.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<Bytes> {
        self.data.read(key)
    }

    /// Returns `true` if a live entry exists for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns the remaining time to live of `key`, if present.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.data.ttl(key)
    }

    fn record(&self, op: StoreOp) -> Result<(), Error> {
        let fail = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        let message = match &op {
            StoreOp::Get(_) => "mock: get failed",
            StoreOp::Set { .. } => "mock: set failed",
            StoreOp::Delete(_) => "mock: delete failed",
        };
        self.operations.lock().push(op);
        if fail { Err(Error::from_message(message)) } else { Ok(()) }
    }
}

impl Store for MockStore {
    fn addr(&self) -> &str {
        self.data.addr()
    }

    fn topology(&self) -> Topology {
        self.data.topology()
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        self.record(StoreOp::Get(key.to_owned()))?;
        Ok(self.data.read(key))
    }

    async fn set_with_expire(&self, key: &str, value: Bytes, expire: Duration) -> Result<(), Error> {
        self.record(StoreOp::Set {
            key: key.to_owned(),
            value: value.clone(),
            expire,
        })?;
        self.data.write(key, value, expire);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, Error> {
        self.record(StoreOp::Delete(keys.to_vec()))?;
        Ok(self.data.remove(keys))
    }
}
