// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{sync::Arc, time::Duration};

use rwcache_store::Store;

use crate::{
    CacheNode, CacheOptions, ConsistentHash, Error, Node, ReadWriteCache, RetryPolicy,
    retry::DeleteRetrier,
    stat::spawn_reporter,
};

/// Builder for [`ReadWriteCache`].
///
/// Created by [`ReadWriteCache::builder`].
///
/// # Examples
///
/// ```
/// use std::{sync::Arc, time::Duration};
///
/// use rwcache::{MemoryStore, ReadWriteCache, Store};
///
/// let writer = Arc::new(MemoryStore::new("primary:6379"));
/// let cache = ReadWriteCache::builder()
///     .writer(writer)
///     .reader(Arc::new(MemoryStore::new("replica-1:6379")))
///     .weighted_reader(Arc::new(MemoryStore::new("replica-2:6379")), 50)
///     .expiry(Duration::from_secs(3600))
///     .build()
///     .unwrap();
///
/// assert_eq!(cache.writer().store().addr(), "primary:6379");
/// ```
#[derive(Debug)]
pub struct ReadWriteCacheBuilder<S> {
    writer: Option<Arc<S>>,
    readers: Vec<(Arc<S>, u32)>,
    options: CacheOptions,
    report_interval: Option<Duration>,
    #[cfg(any(feature = "metrics", test))]
    meter: Option<opentelemetry::metrics::Meter>,
}

impl<S: Store> ReadWriteCacheBuilder<S> {
    pub(crate) fn new() -> Self {
        Self {
            writer: None,
            readers: Vec::new(),
            options: CacheOptions::default(),
            report_interval: None,
            #[cfg(any(feature = "metrics", test))]
            meter: None,
        }
    }

    /// Sets the store receiving every write and delete.
    #[must_use]
    pub fn writer(mut self, store: Arc<S>) -> Self {
        self.writer = Some(store);
        self
    }

    /// Adds a read store with full weight.
    #[must_use]
    pub fn reader(self, store: Arc<S>) -> Self {
        self.weighted_reader(store, 100)
    }

    /// Adds a read store with a share of the hash ring between 1 and 100.
    ///
    /// Adding a store with an address already present replaces the earlier one.
    #[must_use]
    pub fn weighted_reader(mut self, store: Arc<S>, weight: u32) -> Self {
        self.readers.push((store, weight));
        self
    }

    /// Replaces all tunables at once.
    #[must_use]
    pub fn options(mut self, options: CacheOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the base expiry of cached values.
    #[must_use]
    pub fn expiry(mut self, expiry: Duration) -> Self {
        self.options.expiry = expiry;
        self
    }

    /// Sets the base expiry of negative-cache placeholders.
    #[must_use]
    pub fn not_found_expiry(mut self, expiry: Duration) -> Self {
        self.options.not_found_expiry = expiry;
        self
    }

    /// Sets the relative expiry jitter.
    #[must_use]
    pub fn expiry_deviation(mut self, deviation: f64) -> Self {
        self.options.expiry_deviation = deviation;
        self
    }

    /// Sets the virtual nodes per read store at full weight.
    #[must_use]
    pub fn replicas(mut self, replicas: usize) -> Self {
        self.options.replicas = replicas;
        self
    }

    /// Sets the deadline for every store call a node makes.
    #[must_use]
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.options.operation_timeout = timeout;
        self
    }

    /// Sets the retry policy for failed deletes.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.options.retry = policy;
        self
    }

    /// Logs per-node request statistics every `interval`.
    ///
    /// Requires [`build`](Self::build) to run inside a Tokio runtime.
    #[must_use]
    pub fn report_stats_every(mut self, interval: Duration) -> Self {
        self.report_interval = Some(interval);
        self
    }

    /// Records request counters through `meter_provider`.
    #[cfg(any(feature = "metrics", test))]
    #[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
    #[must_use]
    pub fn meter_provider(mut self, meter_provider: &dyn opentelemetry::metrics::MeterProvider) -> Self {
        self.meter = Some(crate::telemetry::create_meter(meter_provider));
        self
    }

    fn node(&self, store: Arc<S>, retrier: &Arc<DeleteRetrier>) -> Arc<CacheNode<S>> {
        let node = CacheNode::with_retrier(store, &self.options, Arc::clone(retrier));
        #[cfg(any(feature = "metrics", test))]
        let node = match &self.meter {
            Some(meter) => node.with_meter(meter),
            None => node,
        };
        Arc::new(node)
    }

    /// Builds the cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no writer or reader was given, if a tunable is out of
    /// range, or if stat reporting was requested outside a Tokio runtime.
    pub fn build(mut self) -> Result<ReadWriteCache<CacheNode<S>>, Error> {
        let Some(writer) = self.writer.take() else {
            return Err(Error::Config("a writer is required".into()));
        };
        if self.readers.is_empty() {
            return Err(Error::Config("at least one reader is required".into()));
        }
        self.options.validate()?;
        if self.report_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(Error::Config("stat report interval must be positive".into()));
        }

        let retrier = Arc::new(DeleteRetrier::new(self.options.retry.clone()));
        let writer = self.node(writer, &retrier);

        let mut ring = ConsistentHash::new(self.options.replicas);
        let mut reported = Vec::with_capacity(self.readers.len());
        for (store, weight) in std::mem::take(&mut self.readers) {
            let node = self.node(store, &retrier);
            reported.push(Arc::downgrade(&node));
            ring.add(node.name().to_owned(), node, weight);
        }

        let cache = ReadWriteCache::new(writer, ring);
        match self.report_interval {
            Some(interval) => {
                let _runtime = tokio::runtime::Handle::try_current()
                    .map_err(|e| Error::Config(format!("stat reporting needs a tokio runtime: {e}")))?;
                Ok(cache.with_reporter(spawn_reporter(reported, interval)))
            }
            None => Ok(cache),
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use opentelemetry::KeyValue;
    use rwcache_store::testing::{MockStore, StoreOp};

    use super::*;
    use crate::{
        telemetry::{CACHE_ACTIVITY_NAME, CACHE_NAME},
        testing::{LogCapture, MetricTester},
    };

    fn store(addr: &str) -> Arc<MockStore> {
        Arc::new(MockStore::new(addr))
    }

    #[test]
    fn writer_is_required() {
        let result = ReadWriteCache::builder().reader(store("r")).build();
        assert!(matches!(result, Err(Error::Config(message)) if message.contains("writer")));
    }

    #[test]
    fn reader_is_required() {
        let result = ReadWriteCache::builder().writer(store("w")).build();
        assert!(matches!(result, Err(Error::Config(message)) if message.contains("reader")));
    }

    #[test]
    fn options_are_validated() {
        let result = ReadWriteCache::builder()
            .writer(store("w"))
            .reader(store("r"))
            .not_found_expiry(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(Error::Config(_))));

        let result = ReadWriteCache::builder().writer(store("w")).reader(store("r")).replicas(0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn reporting_needs_a_runtime() {
        let result = ReadWriteCache::builder()
            .writer(store("w"))
            .reader(store("r"))
            .report_stats_every(Duration::from_secs(60))
            .build();
        assert!(matches!(result, Err(Error::Config(message)) if message.contains("runtime")));
    }

    #[tokio::test]
    async fn zero_report_interval_is_rejected() {
        let result = ReadWriteCache::builder()
            .writer(store("w"))
            .reader(store("r"))
            .report_stats_every(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn readers_are_spread_over_the_ring() {
        let cache = ReadWriteCache::builder()
            .writer(store("w"))
            .reader(store("r1"))
            .reader(store("r2"))
            .reader(store("r3"))
            .build()
            .unwrap();

        let mut seen: Vec<String> = (0..200)
            .map(|i| cache.reader_for(&format!("key:{i}")).unwrap().name().to_owned())
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen, ["r1", "r2", "r3"]);
        assert_eq!(cache.writer().name(), "w");
    }

    #[test]
    fn duplicate_reader_address_replaces_earlier_one() {
        let first = store("r");
        let second = store("r");
        let cache = ReadWriteCache::builder()
            .writer(store("w"))
            .reader(Arc::clone(&first))
            .reader(Arc::clone(&second))
            .build()
            .unwrap();

        assert!(Arc::ptr_eq(cache.reader_for("key").unwrap().store(), &second));
    }

    #[tokio::test]
    async fn nodes_share_options() {
        let writer = store("w");
        let cache = ReadWriteCache::builder()
            .writer(Arc::clone(&writer))
            .reader(store("r"))
            .expiry(Duration::from_secs(100))
            .expiry_deviation(0.0)
            .build()
            .unwrap();

        cache.set("key", &1).await.unwrap();

        assert_eq!(cache.writer().expiry(), Duration::from_secs(100));
        assert_eq!(cache.reader_for("key").unwrap().expiry(), Duration::from_secs(100));
        assert_eq!(writer.count(|op| matches!(op, StoreOp::Set { .. })), 1);
    }

    #[tokio::test]
    async fn counters_are_exported() {
        let tester = MetricTester::new();
        let cache = ReadWriteCache::builder()
            .writer(store("w"))
            .reader(store("r"))
            .meter_provider(tester.meter_provider())
            .build()
            .unwrap();

        assert!(cache.get::<u32>("key").await.unwrap_err().is_not_found());

        let attributes = |activity: &str| [KeyValue::new(CACHE_NAME, "r"), KeyValue::new(CACHE_ACTIVITY_NAME, activity.to_owned())];
        assert_eq!(tester.counter_value(&attributes("cache.request")), 1);
        assert_eq!(tester.counter_value(&attributes("cache.miss")), 1);
        assert_eq!(tester.counter_value(&attributes("cache.hit")), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stats_are_reported_periodically() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        let cache = ReadWriteCache::builder()
            .writer(store("w"))
            .reader(store("r"))
            .report_stats_every(Duration::from_secs(60))
            .build()
            .unwrap();

        assert!(cache.get::<u32>("key").await.is_err());
        tokio::time::sleep(Duration::from_secs(61)).await;

        capture.assert_contains("cache stats");
        capture.assert_contains("requests=1");
    }
}
