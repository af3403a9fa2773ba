// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-process store with per-entry expiry.

use std::{collections::HashMap, sync::Arc, time::Duration};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{Error, Store, Topology};

/// Deadline used when an expiry does not fit the clock.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// A store that keeps entries in process memory.
///
/// Entries expire lazily: an expired entry is dropped the next time it is read or deleted.
/// Expiry is measured with the tokio clock, so paused-time tests can move it forward.
///
/// Clones share the same entries, which makes one `MemoryStore` usable as both the write
/// node and the read replicas of a cache.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use bytes::Bytes;
/// use rwcache_store::{MemoryStore, Store};
/// # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
///
/// let store = MemoryStore::new("memory");
/// store.set_with_expire("key", Bytes::from_static(b"42"), Duration::from_secs(60)).await?;
/// assert_eq!(store.get("key").await?, Some(Bytes::from_static(b"42")));
/// # Ok::<(), rwcache_store::Error>(())
/// # }).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    addr: Arc<str>,
    topology: Topology,
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    /// Creates an empty store reporting the given address.
    #[must_use]
    pub fn new(addr: impl Into<Arc<str>>) -> Self {
        Self {
            addr: addr.into(),
            topology: Topology::Node,
            entries: Arc::default(),
        }
    }

    /// Makes the store report the given topology.
    #[must_use]
    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Returns the number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|entry| entry.is_live(now)).count()
    }

    /// Returns `true` if the store holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if a live entry exists for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.read(key).is_some()
    }

    /// Returns the remaining time to live of `key`, if present.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expires_at.saturating_duration_since(now))
    }

    pub(crate) fn read(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub(crate) fn write(&self, key: &str, value: Bytes, expire: Duration) {
        let now = Instant::now();
        let expires_at = now
            .checked_add(expire)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        self.entries.lock().insert(key.to_owned(), Entry { value, expires_at });
    }

    pub(crate) fn remove(&self, keys: &[String]) -> u64 {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let mut removed = 0;
        for key in keys {
            if entries.remove(key).is_some_and(|entry| entry.is_live(now)) {
                removed += 1;
            }
        }
        removed
    }
}

impl Store for MemoryStore {
    fn addr(&self) -> &str {
        &self.addr
    }

    fn topology(&self) -> Topology {
        self.topology
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        Ok(self.read(key))
    }

    async fn set_with_expire(&self, key: &str, value: Bytes, expire: Duration) -> Result<(), Error> {
        self.write(key, value, expire);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, Error> {
        Ok(self.remove(keys))
    }
}
