// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Connection tests that do not need a running Redis server.

use rwcache_redis::{RedisConfig, RedisStore, connect_shared};
use rwcache_store::{Registry, Topology};

#[tokio::test]
async fn invalid_url_fails_to_connect() {
    let config = RedisConfig::new("redis://localhost:not-a-port");
    assert!(RedisStore::connect(&config).await.is_err());
}

#[tokio::test]
async fn invalid_cluster_url_fails_to_connect() {
    let config = RedisConfig::new("redis://localhost:not-a-port").topology(Topology::Cluster);
    assert!(RedisStore::connect(&config).await.is_err());
}

#[tokio::test]
async fn failed_shared_connect_leaves_registry_empty() {
    let registry = Registry::new();
    let config = RedisConfig::new("redis://localhost:not-a-port");

    assert!(connect_shared(&registry, &config).await.is_err());
    assert!(registry.is_empty());
    assert!(registry.get(&config.addr).is_none());
}
