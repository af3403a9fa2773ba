// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{fmt, time::Duration};

use bytes::Bytes;
use redis::{Cmd, FromRedisValue, RedisError, aio::ConnectionManager, cluster::ClusterClient, cluster_async::ClusterConnection};
use rwcache_store::{Error, Store, Topology, ttl_seconds};

use crate::RedisConfig;

#[derive(Clone)]
enum Connection {
    Node(ConnectionManager),
    Cluster(ClusterConnection),
}

impl Connection {
    async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T, RedisError> {
        match self {
            Self::Node(conn) => cmd.query_async(&mut conn.clone()).await,
            Self::Cluster(conn) => cmd.query_async(&mut conn.clone()).await,
        }
    }
}

/// A [`Store`] backed by Redis.
///
/// Cloning is cheap and clones share the underlying connection.
#[derive(Clone)]
pub struct RedisStore {
    addr: String,
    topology: Topology,
    conn: Connection,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("addr", &self.addr)
            .field("topology", &self.topology)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connects to the endpoint described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the initial connection fails.
    pub async fn connect(config: &RedisConfig) -> Result<Self, Error> {
        let url = config.url();
        let conn = match config.topology {
            Topology::Node => {
                let client = redis::Client::open(url).map_err(Error::caused_by)?;
                Connection::Node(client.get_connection_manager().await.map_err(Error::caused_by)?)
            }
            Topology::Cluster => {
                let client = ClusterClient::new(vec![url]).map_err(Error::caused_by)?;
                Connection::Cluster(client.get_async_connection().await.map_err(Error::caused_by)?)
            }
        };

        tracing::info!(redis.addr = %config.addr, redis.topology = ?config.topology, "connected to redis");

        Ok(Self {
            addr: config.addr.clone(),
            topology: config.topology,
            conn,
        })
    }
}

impl Store for RedisStore {
    fn addr(&self) -> &str {
        &self.addr
    }

    fn topology(&self) -> Topology {
        self.topology
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        let value: Option<Vec<u8>> = self.conn.query(&cmd).await.map_err(Error::caused_by)?;
        Ok(value.map(Bytes::from))
    }

    async fn set_with_expire(&self, key: &str, value: Bytes, expire: Duration) -> Result<(), Error> {
        let mut cmd = redis::cmd("SETEX");
        cmd.arg(key).arg(ttl_seconds(expire)).arg(value.to_vec());
        self.conn.query::<()>(&cmd).await.map_err(Error::caused_by)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, Error> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("DEL");
        for key in keys {
            cmd.arg(key);
        }
        self.conn.query(&cmd).await.map_err(Error::caused_by)
    }
}
