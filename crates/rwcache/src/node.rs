// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache nodes: one store connection plus the per-node state around it.

use std::{fmt::Debug, sync::Arc, time::Duration};

use bytes::Bytes;
use rwcache_store::{Store, Topology};

use crate::{CacheOptions, CacheStat, Error, Flight, expiry::Jitter, retry::DeleteRetrier};

/// The operations the cache needs from a node.
///
/// [`CacheNode`] is the implementation used by the builder. The trait exists so that
/// [`ReadWriteCache`](crate::ReadWriteCache) and the cache-aside sequence work against
/// nodes without knowing their concrete type.
pub trait Node: Send + Sync + 'static {
    /// Returns the node name used in logs and metrics.
    fn name(&self) -> &str;

    /// Returns the default expiry for values written through this node, with jitter applied.
    fn expiry(&self) -> Duration;

    /// Returns the expiry for negative-cache placeholders, with jitter applied.
    fn not_found_expiry(&self) -> Duration;

    /// Returns the node's request counters.
    fn stat(&self) -> &CacheStat;

    /// Returns the node's request coalescing table.
    fn flight(&self) -> &Flight;

    /// Reads the raw bytes stored under `key`.
    fn get_raw(&self, key: &str) -> impl Future<Output = Result<Option<Bytes>, Error>> + Send;

    /// Writes raw bytes under `key`.
    fn set_raw(&self, key: &str, value: Bytes, expire: Duration) -> impl Future<Output = Result<(), Error>> + Send;

    /// Deletes `keys` with a single attempt.
    fn delete_raw(&self, keys: &[String]) -> impl Future<Output = Result<(), Error>> + Send;

    /// Deletes `keys`, logging failures and retrying them in the background.
    fn delete(&self, keys: &[String]) -> impl Future<Output = ()> + Send;
}

/// A [`Node`] backed by a [`Store`].
pub struct CacheNode<S> {
    name: String,
    store: Arc<S>,
    expiry: Duration,
    not_found_expiry: Duration,
    operation_timeout: Duration,
    jitter: Jitter,
    flight: Flight,
    stat: CacheStat,
    retrier: Arc<DeleteRetrier>,
}

impl<S: Debug> Debug for CacheNode<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheNode")
            .field("name", &self.name)
            .field("store", &self.store)
            .field("expiry", &self.expiry)
            .field("not_found_expiry", &self.not_found_expiry)
            .field("operation_timeout", &self.operation_timeout)
            .field("flight", &self.flight)
            .field("stat", &self.stat)
            .finish_non_exhaustive()
    }
}

impl<S: Store> CacheNode<S> {
    /// Creates a node for `store`, named after the store address.
    ///
    /// The node gets its own delete retry executor. Nodes built by
    /// [`ReadWriteCacheBuilder`](crate::ReadWriteCacheBuilder) share one instead.
    #[must_use]
    pub fn new(store: Arc<S>, options: &CacheOptions) -> Self {
        Self::with_retrier(store, options, Arc::new(DeleteRetrier::new(options.retry.clone())))
    }

    pub(crate) fn with_retrier(store: Arc<S>, options: &CacheOptions, retrier: Arc<DeleteRetrier>) -> Self {
        let name = store.addr().to_owned();
        Self {
            stat: CacheStat::new(name.clone()),
            name,
            store,
            expiry: options.expiry,
            not_found_expiry: options.not_found_expiry,
            operation_timeout: options.operation_timeout,
            jitter: Jitter::new(options.expiry_deviation),
            flight: Flight::new(),
            retrier,
        }
    }

    #[cfg(any(feature = "metrics", test))]
    pub(crate) fn with_meter(mut self, meter: &opentelemetry::metrics::Meter) -> Self {
        self.stat = CacheStat::new(self.name.clone()).with_telemetry(crate::telemetry::NodeTelemetry::new(&self.name, meter));
        self
    }

    #[cfg(test)]
    pub(crate) fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns the store behind this node.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Runs one store call under the node's operation timeout.
    async fn call<T>(&self, operation: impl Future<Output = Result<T, rwcache_store::Error>>) -> Result<T, Error> {
        match tokio::time::timeout(self.operation_timeout, operation).await {
            Ok(result) => result.map_err(|e| Error::store(&self.name, e)),
            Err(elapsed) => Err(Error::store(&self.name, rwcache_store::Error::caused_by(elapsed))),
        }
    }

    fn retry_delete(&self, keys: Vec<String>) {
        drop(self.retrier.schedule(self.name.clone(), Arc::clone(&self.store), keys));
    }
}

impl<S: Store> Node for CacheNode<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn expiry(&self) -> Duration {
        self.jitter.apply(self.expiry)
    }

    fn not_found_expiry(&self) -> Duration {
        self.jitter.apply(self.not_found_expiry)
    }

    fn stat(&self) -> &CacheStat {
        &self.stat
    }

    fn flight(&self) -> &Flight {
        &self.flight
    }

    async fn get_raw(&self, key: &str) -> Result<Option<Bytes>, Error> {
        self.call(self.store.get(key)).await
    }

    async fn set_raw(&self, key: &str, value: Bytes, expire: Duration) -> Result<(), Error> {
        self.call(self.store.set_with_expire(key, value, expire)).await
    }

    async fn delete_raw(&self, keys: &[String]) -> Result<(), Error> {
        self.call(self.store.delete(keys)).await.map(|_| ())
    }

    async fn delete(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }

        // Clusters may not serve multi-key deletes across shards.
        if keys.len() > 1 && self.store.topology() == Topology::Cluster {
            for key in keys {
                let key = std::slice::from_ref(key);
                if let Err(e) = self.delete_raw(key).await {
                    tracing::error!(cache.node = %self.name, cache.keys = ?key, error = %e, "failed to clear cache");
                    self.retry_delete(key.to_vec());
                }
            }
        } else if let Err(e) = self.delete_raw(keys).await {
            tracing::error!(cache.node = %self.name, cache.keys = ?keys, error = %e, "failed to clear cache");
            self.retry_delete(keys.to_vec());
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use rwcache_store::testing::{MockStore, StoreOp};

    use super::*;

    fn node(store: &MockStore) -> CacheNode<MockStore> {
        CacheNode::new(Arc::new(store.clone()), &CacheOptions::default())
    }

    /// A store whose calls never complete.
    #[derive(Debug)]
    struct Hanging;

    impl Store for Hanging {
        fn addr(&self) -> &str {
            "hanging"
        }

        async fn get(&self, _key: &str) -> Result<Option<Bytes>, rwcache_store::Error> {
            std::future::pending().await
        }

        async fn set_with_expire(&self, _key: &str, _value: Bytes, _expire: Duration) -> Result<(), rwcache_store::Error> {
            std::future::pending().await
        }

        async fn delete(&self, _keys: &[String]) -> Result<u64, rwcache_store::Error> {
            std::future::pending().await
        }
    }

    fn keys(keys: &[&str]) -> Vec<String> {
        keys.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn named_after_store_address() {
        let node = node(&MockStore::new("10.0.0.1:6379"));
        assert_eq!(node.name(), "10.0.0.1:6379");
        assert_eq!(node.stat().name(), "10.0.0.1:6379");
    }

    #[test]
    fn expiries_are_jittered() {
        let options = CacheOptions::default();
        let node = node(&MockStore::new("node")).with_jitter(Jitter::new(0.05).fixed(1.0));

        let close = |actual: Duration, expected: Duration| (actual.as_secs_f64() - expected.as_secs_f64()).abs() < 1e-3;
        assert!(close(node.expiry(), options.expiry.mul_f64(0.95)));
        assert!(close(node.not_found_expiry(), options.not_found_expiry.mul_f64(0.95)));
    }

    #[tokio::test]
    async fn store_errors_name_the_node() {
        let store = MockStore::new("node-a");
        store.fail_when(|_| true);
        let node = node(&store);

        let error = node.get_raw("key").await.unwrap_err();
        assert!(matches!(&error, Error::Store { node, .. } if node == "node-a"));
        assert!(node.set_raw("key", Bytes::new(), Duration::from_secs(1)).await.is_err());
        assert!(node.delete_raw(&keys(&["key"])).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn raw_operations_reach_the_store() {
        let store = MockStore::new("node");
        let node = node(&store);

        node.set_raw("key", Bytes::from_static(b"1"), Duration::from_secs(30)).await.unwrap();
        assert_eq!(node.get_raw("key").await.unwrap(), Some(Bytes::from_static(b"1")));
        assert_eq!(store.ttl("key"), Some(Duration::from_secs(30)));

        node.delete_raw(&keys(&["key"])).await.unwrap();
        assert_eq!(node.get_raw("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_without_keys_is_a_no_op() {
        let store = MockStore::new("node");
        node(&store).delete(&[]).await;
        assert!(store.operations().is_empty());
    }

    #[tokio::test]
    async fn single_node_deletes_in_one_batch() {
        let store = MockStore::new("node");
        node(&store).delete(&keys(&["a", "b", "c"])).await;
        assert_eq!(store.operations(), vec![StoreOp::Delete(keys(&["a", "b", "c"]))]);
    }

    #[tokio::test]
    async fn cluster_deletes_key_by_key() {
        let store = MockStore::cluster("cluster");
        node(&store).delete(&keys(&["a", "b"])).await;
        assert_eq!(
            store.operations(),
            vec![StoreOp::Delete(keys(&["a"])), StoreOp::Delete(keys(&["b"]))]
        );
    }

    #[tokio::test]
    async fn cluster_single_key_is_not_split() {
        let store = MockStore::cluster("cluster");
        node(&store).delete(&keys(&["a"])).await;
        assert_eq!(store.operations(), vec![StoreOp::Delete(keys(&["a"]))]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_batch_is_retried_in_background() {
        let store = MockStore::new("node");
        store.insert_raw("a", &b"1"[..], Duration::from_secs(3600));
        store.insert_raw("b", &b"2"[..], Duration::from_secs(3600));
        store.fail_when(|op| matches!(op, StoreOp::Delete(_)));
        let node = node(&store);

        node.delete(&keys(&["a", "b"])).await;
        assert!(store.contains_key("a"));

        store.clear_failures();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(!store.contains_key("a"));
        assert!(!store.contains_key("b"));
        assert_eq!(store.count(|op| *op == StoreOp::Delete(keys(&["a", "b"]))), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn store_calls_time_out() {
        let options = CacheOptions {
            operation_timeout: Duration::from_secs(2),
            ..CacheOptions::default()
        };
        let node = CacheNode::new(Arc::new(Hanging), &options);
        let started = tokio::time::Instant::now();

        let error = node.get_raw("key").await.unwrap_err();
        assert!(matches!(&error, Error::Store { node, .. } if node == "hanging"));
        assert_eq!(started.elapsed(), Duration::from_secs(2));

        assert!(matches!(
            node.set_raw("key", Bytes::new(), Duration::from_secs(1)).await,
            Err(Error::Store { .. })
        ));
        assert!(matches!(node.delete_raw(&keys(&["key"])).await, Err(Error::Store { .. })));
    }
}
