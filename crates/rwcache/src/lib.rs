// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Cache-aside over a write node and a set of read replicas.
//!
//! This crate puts a cache in front of a system of record, with:
//! - Writes and deletes sent to one write node, reads spread over read nodes by consistent hashing
//! - Request coalescing, so concurrent misses for a key query the system of record once
//! - Negative caching of absent keys with a short-lived placeholder
//! - Jittered expiries to avoid synchronized mass expiry
//! - Background retries of failed deletes
//! - Per-node request statistics, logged periodically and optionally exported as OpenTelemetry metrics
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use rwcache::{Error, MemoryStore, ReadWriteCache};
//! use serde::{Deserialize, Serialize};
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! let primary = Arc::new(MemoryStore::new("primary"));
//! let cache = ReadWriteCache::builder().writer(Arc::clone(&primary)).reader(primary).build()?;
//!
//! let user: User = cache
//!     .take("user:7", || async {
//!         // Load from the database here.
//!         Ok::<_, Error>(Some(User { id: 7, name: "ada".into() }))
//!     })
//!     .await?;
//! assert_eq!(user.name, "ada");
//!
//! // Absent keys are remembered for a while.
//! let missing = cache.take("user:8", || async { Ok::<Option<User>, Error>(None) }).await;
//! assert!(missing.unwrap_err().is_not_found());
//!
//! // Invalidate after updating the database.
//! cache.delete(&["user:7"]).await;
//! # Ok::<(), Error>(())
//! # }).unwrap();
//! ```
//!
//! # Features
//!
//! - `redis`: Redis-backed stores and [`CacheConfig::connect`].
//! - `metrics`: OpenTelemetry counters through [`ReadWriteCacheBuilder::meter_provider`].
//! - `test-util`: a recording, failure-injecting mock store.

mod aside;
mod builder;
mod cache;
pub mod codec;
mod config;
mod error;
mod expiry;
mod flight;
mod node;
mod retry;
mod ring;
mod stat;
#[cfg(any(feature = "metrics", test))]
mod telemetry;
#[cfg(test)]
mod testing;

#[doc(inline)]
pub use builder::ReadWriteCacheBuilder;
#[doc(inline)]
pub use cache::ReadWriteCache;
#[doc(inline)]
pub use config::{CacheConfig, CacheOptions, NodeConfig};
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use flight::Flight;
#[doc(inline)]
pub use node::{CacheNode, Node};
#[doc(inline)]
pub use retry::{RetryOutcome, RetryPolicy};
#[doc(inline)]
pub use ring::{ConsistentHash, Dispatcher};
#[cfg(feature = "redis")]
#[doc(inline)]
pub use rwcache_redis::{RedisConfig, RedisStore};
#[doc(inline)]
pub use rwcache_store::{MemoryStore, Registry, Store, Topology};
#[cfg(any(feature = "test-util", test))]
#[doc(inline)]
pub use rwcache_store::testing::{MockStore, StoreOp};
#[doc(inline)]
pub use stat::{CacheStat, StatSnapshot};
