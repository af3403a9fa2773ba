// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The core trait for key-value store connections.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Deployment shape of the store behind a connection.
///
/// Cluster stores may not support efficient multi-key operations across shards, so callers
/// split such operations into single-key requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// A single node, possibly with replicas.
    #[default]
    Node,
    /// A sharded cluster.
    Cluster,
}

/// A connection to a key-value store.
///
/// Values are opaque byte payloads. An absent key is reported as `Ok(None)`; errors are
/// reserved for transport and server failures.
///
/// Every operation must be safe to call concurrently from many tasks.
pub trait Store: Send + Sync + 'static {
    /// Returns the address this connection points at, used to name cache nodes.
    fn addr(&self) -> &str;

    /// Returns the deployment shape of the store.
    fn topology(&self) -> Topology {
        Topology::Node
    }

    /// Reads the raw value stored under `key`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Bytes>, Error>> + Send;

    /// Writes `value` under `key`, expiring it after `expire`.
    fn set_with_expire(&self, key: &str, value: Bytes, expire: Duration) -> impl Future<Output = Result<(), Error>> + Send;

    /// Deletes `keys`, returning how many of them existed.
    fn delete(&self, keys: &[String]) -> impl Future<Output = Result<u64, Error>> + Send;
}

/// Converts an expiry into whole seconds for stores that only accept second granularity.
///
/// Rounds up and never returns less than one second, so a short expiry never turns into
/// "no expiry" or an invalid request.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// assert_eq!(rwcache_store::ttl_seconds(Duration::from_millis(1500)), 2);
/// assert_eq!(rwcache_store::ttl_seconds(Duration::ZERO), 1);
/// ```
#[must_use]
pub fn ttl_seconds(expire: Duration) -> u64 {
    let secs = expire.as_secs().saturating_add(u64::from(expire.subsec_nanos() > 0));
    secs.max(1)
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_defaults_to_node() {
        assert_eq!(Topology::default(), Topology::Node);
    }

    #[test]
    fn topology_deserializes_lowercase() {
        let topology: Topology = serde_json::from_str("\"cluster\"").unwrap();
        assert_eq!(topology, Topology::Cluster);

        let topology: Topology = serde_json::from_str("\"node\"").unwrap();
        assert_eq!(topology, Topology::Node);
    }

    #[test]
    fn ttl_seconds_rounds_up() {
        assert_eq!(ttl_seconds(Duration::from_secs(60)), 60);
        assert_eq!(ttl_seconds(Duration::from_millis(60_001)), 61);
        assert_eq!(ttl_seconds(Duration::from_nanos(1)), 1);
    }

    #[test]
    fn ttl_seconds_is_at_least_one() {
        assert_eq!(ttl_seconds(Duration::ZERO), 1);
    }

    #[test]
    fn ttl_seconds_saturates() {
        assert_eq!(ttl_seconds(Duration::MAX), u64::MAX);
    }
}
