// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use rwcache_store::Topology;
use serde::{Deserialize, Serialize};

/// Connection settings for one Redis endpoint.
///
/// # Examples
///
/// ```
/// use rwcache_redis::RedisConfig;
/// use rwcache_store::Topology;
///
/// let config = RedisConfig::new("10.0.0.1:6379").password("secret");
/// assert_eq!(config.url(), "redis://:secret@10.0.0.1:6379");
/// assert_eq!(config.topology, Topology::Node);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// `host:port` of the endpoint, or a full `redis://` / `rediss://` URL.
    pub addr: String,
    /// Optional password sent on connect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Whether the endpoint is a single node or a cluster seed.
    #[serde(default)]
    pub topology: Topology,
}

impl RedisConfig {
    /// Creates settings for a single node at `addr` without a password.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            password: None,
            topology: Topology::Node,
        }
    }

    /// Sets the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the topology.
    #[must_use]
    pub fn topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Returns the connection URL for the endpoint.
    ///
    /// An `addr` that already is a URL is returned unchanged.
    #[must_use]
    pub fn url(&self) -> String {
        if self.addr.starts_with("redis://") || self.addr.starts_with("rediss://") {
            return self.addr.clone();
        }

        match self.password.as_deref() {
            Some(password) if !password.is_empty() => format!("redis://:{password}@{}", self.addr),
            _ => format!("redis://{}", self.addr),
        }
    }
}
