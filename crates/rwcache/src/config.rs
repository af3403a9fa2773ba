// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Configuration types.

use std::{sync::Arc, time::Duration};

use rwcache_store::{Registry, Store, Topology};
use serde::{Deserialize, Deserializer};

use crate::{CacheNode, Error, ReadWriteCache, RetryPolicy};

const DEFAULT_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const DEFAULT_NOT_FOUND_EXPIRY: Duration = Duration::from_secs(60);
const DEFAULT_EXPIRY_DEVIATION: f64 = 0.05;
const DEFAULT_REPLICAS: usize = 100;
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_WEIGHT: u32 = 100;

/// Tunables shared by every node of a cache.
///
/// Durations are given in seconds when deserialized; fractions are allowed.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use rwcache::CacheOptions;
///
/// let options: CacheOptions = serde_json::from_str(r#"{"expiry": 3600, "not_found_expiry": 1.5}"#).unwrap();
/// assert_eq!(options.expiry, Duration::from_secs(3600));
/// assert_eq!(options.not_found_expiry, Duration::from_millis(1500));
/// assert_eq!(options.replicas, CacheOptions::default().replicas);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Base expiry of cached values.
    #[serde(deserialize_with = "duration_secs")]
    pub expiry: Duration,
    /// Base expiry of negative-cache placeholders.
    #[serde(deserialize_with = "duration_secs")]
    pub not_found_expiry: Duration,
    /// Relative jitter applied to both expiries, clamped to `[0, 1]`.
    pub expiry_deviation: f64,
    /// Virtual nodes per read node on the hash ring, at full weight.
    pub replicas: usize,
    /// Deadline for a single store call made by a node.
    #[serde(deserialize_with = "duration_secs")]
    pub operation_timeout: Duration,
    /// Retry policy for failed deletes.
    pub retry: RetryPolicy,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            expiry: DEFAULT_EXPIRY,
            not_found_expiry: DEFAULT_NOT_FOUND_EXPIRY,
            expiry_deviation: DEFAULT_EXPIRY_DEVIATION,
            replicas: DEFAULT_REPLICAS,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl CacheOptions {
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.expiry.is_zero() {
            return Err(Error::Config("expiry must be positive".into()));
        }
        if self.not_found_expiry.is_zero() {
            return Err(Error::Config("not_found_expiry must be positive".into()));
        }
        if self.replicas == 0 {
            return Err(Error::Config("replicas must be positive".into()));
        }
        if self.operation_timeout.is_zero() {
            return Err(Error::Config("operation_timeout must be positive".into()));
        }
        Ok(())
    }
}

/// One store endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeConfig {
    /// Address of the store.
    pub addr: String,
    /// Optional password.
    #[serde(default)]
    pub password: Option<String>,
    /// Single node or cluster.
    #[serde(default)]
    pub topology: Topology,
    /// Share of the hash ring, from 1 to 100. Ignored for the write node.
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    DEFAULT_WEIGHT
}

impl NodeConfig {
    /// Creates settings for a single node at `addr` with full weight.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            password: None,
            topology: Topology::Node,
            weight: DEFAULT_WEIGHT,
        }
    }

    #[cfg(feature = "redis")]
    fn redis_config(&self) -> rwcache_redis::RedisConfig {
        rwcache_redis::RedisConfig {
            addr: self.addr.clone(),
            password: self.password.clone(),
            topology: self.topology,
        }
    }
}

/// Full description of a read/write split cache.
///
/// # Examples
///
/// ```
/// use rwcache::CacheConfig;
///
/// let config: CacheConfig = serde_json::from_str(
///     r#"{
///         "writer": { "addr": "10.0.0.1:6379" },
///         "readers": [
///             { "addr": "10.0.0.2:6379" },
///             { "addr": "10.0.0.3:6379", "weight": 50 }
///         ],
///         "expiry": 3600
///     }"#,
/// )
/// .unwrap();
///
/// assert_eq!(config.readers.len(), 2);
/// assert_eq!(config.readers[1].weight, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CacheConfig {
    /// The node receiving every write and delete.
    pub writer: NodeConfig,
    /// The nodes serving reads.
    pub readers: Vec<NodeConfig>,
    /// Tunables shared by all nodes.
    #[serde(flatten)]
    pub options: CacheOptions,
}

impl CacheConfig {
    /// Builds the cache, taking connections from `registry` and creating missing ones with
    /// `connect`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if a connection cannot be created and [`Error::Config`] if
    /// the configuration is invalid.
    pub async fn connect_with<S, F, Fut>(&self, registry: &Registry<S>, connect: F) -> Result<ReadWriteCache<CacheNode<S>>, Error>
    where
        S: Store,
        F: Fn(&NodeConfig) -> Fut,
        Fut: Future<Output = Result<S, rwcache_store::Error>>,
    {
        let writer = shared(registry, &self.writer, &connect).await?;
        let mut builder = ReadWriteCache::builder().writer(writer).options(self.options.clone());
        for reader in &self.readers {
            builder = builder.weighted_reader(shared(registry, reader, &connect).await?, reader.weight);
        }
        builder.build()
    }

    /// Builds a Redis-backed cache, sharing connections through `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if a connection cannot be created and [`Error::Config`] if
    /// the configuration is invalid.
    #[cfg(feature = "redis")]
    #[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
    pub async fn connect(
        &self,
        registry: &Registry<rwcache_redis::RedisStore>,
    ) -> Result<ReadWriteCache<CacheNode<rwcache_redis::RedisStore>>, Error> {
        self.connect_with(registry, |node| {
            let config = node.redis_config();
            async move { rwcache_redis::RedisStore::connect(&config).await }
        })
        .await
    }
}

async fn shared<S, F, Fut>(registry: &Registry<S>, node: &NodeConfig, connect: &F) -> Result<Arc<S>, Error>
where
    F: Fn(&NodeConfig) -> Fut,
    Fut: Future<Output = Result<S, rwcache_store::Error>>,
{
    registry
        .get_or_connect(&node.addr, || connect(node))
        .await
        .map_err(|e| Error::store(&node.addr, e))
}

/// Deserializes a [`Duration`] from a number of seconds.
pub(crate) fn duration_secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
