// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Redis-backed [`Store`](rwcache_store::Store) for the `rwcache` read/write split cache.
//!
//! A [`RedisStore`] is created from a [`RedisConfig`]. Single nodes are reached through a
//! reconnecting connection manager; clusters through a cluster connection, in which case
//! the store reports [`Topology::Cluster`](rwcache_store::Topology::Cluster).
//!
//! Connections are usually shared through a [`Registry`](rwcache_store::Registry), so that
//! several cache nodes configured with the same address reuse one connection. See
//! [`connect_shared`].

mod config;
mod store;

use std::sync::Arc;

#[doc(inline)]
pub use config::RedisConfig;
use rwcache_store::{Error, Registry};
#[doc(inline)]
pub use store::RedisStore;

/// Returns the registry's connection for `config.addr`, connecting on first use.
///
/// # Errors
///
/// Returns an error if no connection exists yet and connecting fails. A failed attempt is
/// not remembered; the next call tries again.
pub async fn connect_shared(registry: &Registry<RedisStore>, config: &RedisConfig) -> Result<Arc<RedisStore>, Error> {
    registry.get_or_connect(&config.addr, || RedisStore::connect(config)).await
}
