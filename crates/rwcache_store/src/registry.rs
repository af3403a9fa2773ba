// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Shared connections keyed by address.

use std::{collections::HashMap, fmt::Debug, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::Error;

type Slot<S> = Arc<OnceCell<Arc<S>>>;

/// Owns one store connection per address.
///
/// The first request for an address creates the connection; later requests, including
/// ones racing with the first, share it. Failed connection attempts are not remembered,
/// so the next request tries again.
///
/// The registry is owned by whatever builds the cache nodes. Dropping it does not close
/// connections that are still referenced by nodes.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use rwcache_store::{MemoryStore, Registry};
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
///
/// let registry = Registry::new();
/// let first = registry.get_or_connect("127.0.0.1:6379", || async { Ok(MemoryStore::new("127.0.0.1:6379")) }).await?;
/// let second = registry.get_or_connect("127.0.0.1:6379", || async { Ok(MemoryStore::new("other")) }).await?;
/// assert!(Arc::ptr_eq(&first, &second));
/// # Ok::<(), rwcache_store::Error>(())
/// # }).unwrap();
/// ```
pub struct Registry<S> {
    slots: Mutex<HashMap<String, Slot<S>>>,
}

impl<S> Debug for Registry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("addrs", &self.slots.lock().len()).finish()
    }
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<S> Registry<S> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the connection for `addr`, creating it with `connect` on first use.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `connect` when the connection has to be created and
    /// creation fails.
    pub async fn get_or_connect<F, Fut>(&self, addr: &str, connect: F) -> Result<Arc<S>, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S, Error>>,
    {
        let slot = Arc::clone(self.slots.lock().entry(addr.to_owned()).or_default());
        slot.get_or_try_init(|| async move { connect().await.map(Arc::new) })
            .await
            .map(Arc::clone)
    }

    /// Returns the connection for `addr` if it has already been created.
    #[must_use]
    pub fn get(&self, addr: &str) -> Option<Arc<S>> {
        self.slots.lock().get(addr).and_then(|slot| slot.get().map(Arc::clone))
    }

    /// Returns the number of addresses with an established connection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().values().filter(|slot| slot.initialized()).count()
    }

    /// Returns `true` if no connection has been established yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::MemoryStore;

    #[tokio::test]
    async fn connects_once_per_address() {
        let registry = Registry::new();
        let connects = AtomicUsize::new(0);

        for _ in 0..3 {
            registry
                .get_or_connect("a", || async {
                    connects.fetch_add(1, Ordering::SeqCst);
                    Ok(MemoryStore::new("a"))
                })
                .await
                .unwrap();
        }

        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn distinct_addresses_get_distinct_connections() {
        let registry = Registry::new();
        let a = registry.get_or_connect("a", || async { Ok(MemoryStore::new("a")) }).await.unwrap();
        let b = registry.get_or_connect("b", || async { Ok(MemoryStore::new("b")) }).await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
        assert!(registry.get("a").is_some());
        assert!(registry.get("c").is_none());
    }

    #[tokio::test]
    async fn concurrent_first_use_connects_once() {
        let registry = Registry::new();
        let connects = AtomicUsize::new(0);
        let connect = || async {
            connects.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(MemoryStore::new("a"))
        };

        let (first, second) = tokio::join!(registry.get_or_connect("a", connect), registry.get_or_connect("a", connect));

        assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_connect_is_retried() {
        let registry: Registry<MemoryStore> = Registry::new();

        let error = registry
            .get_or_connect("a", || async { Err(Error::from_message("refused")) })
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "refused");
        assert!(registry.is_empty());

        registry.get_or_connect("a", || async { Ok(MemoryStore::new("a")) }).await.unwrap();
        assert_eq!(registry.len(), 1);
    }
}
