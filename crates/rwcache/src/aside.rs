// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The cache-aside sequence.
//!
//! Reads go to a reader node. Everything written as a side effect of a read (fetched
//! values, negative-cache placeholders, deletes of corrupt entries) goes to the writer
//! node, which may or may not be the same node.

use std::{error::Error as StdError, sync::Arc, time::Duration};

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::oneshot;

use crate::{Error, Node, codec};

pub(crate) enum Lookup<T> {
    Hit { value: T, raw: Bytes },
    Placeholder,
    Miss,
}

/// Reads `key` from `reader` and classifies the result, updating the reader's counters.
///
/// Transport failures are returned as errors. An empty payload counts as absent. Corrupt
/// entries are deleted through `writer` and reported as a miss.
pub(crate) async fn lookup<T, R, W>(reader: &R, writer: &W, key: &str) -> Result<Lookup<T>, Error>
where
    T: DeserializeOwned,
    R: Node,
    W: Node,
{
    let stat = reader.stat();
    stat.increment_total();

    let raw = match reader.get_raw(key).await {
        Ok(Some(raw)) if !raw.is_empty() => raw,
        Ok(_) => {
            stat.increment_miss();
            return Ok(Lookup::Miss);
        }
        Err(e) => {
            stat.increment_miss();
            return Err(e);
        }
    };

    stat.increment_hit();
    if codec::is_placeholder(&raw) {
        return Ok(Lookup::Placeholder);
    }

    match codec::decode(&raw) {
        Ok(value) => Ok(Lookup::Hit { value, raw }),
        Err(e) => {
            tracing::error!(
                cache.node = reader.name(),
                cache.key = key,
                cache.value = %String::from_utf8_lossy(&raw),
                error = %e,
                "unmarshal cache"
            );
            if let Err(e) = writer.delete_raw(&[key.to_owned()]).await {
                tracing::error!(cache.node = writer.name(), cache.key = key, error = %e, "delete invalid cache");
            }
            Ok(Lookup::Miss)
        }
    }
}

/// Plain read: never queries the system of record.
pub(crate) async fn get<T, R, W>(reader: &R, writer: &W, key: &str) -> Result<T, Error>
where
    T: DeserializeOwned,
    R: Node,
    W: Node,
{
    match lookup(reader, writer, key).await? {
        Lookup::Hit { value, .. } => Ok(value),
        Lookup::Placeholder | Lookup::Miss => Err(Error::NotFound),
    }
}

/// Get-or-query-and-populate, coalesced per key on the reader node.
pub(crate) async fn take<T, R, W, F, Fut, E>(reader: &Arc<R>, writer: &Arc<W>, key: &str, expire: Duration, query: F) -> Result<T, Error>
where
    T: Serialize + DeserializeOwned + Send + 'static,
    R: Node,
    W: Node,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
    E: Into<Box<dyn StdError + Send + Sync>> + 'static,
{
    // The leader's own work hands its decoded value back, so only waiters decode the
    // shared bytes.
    let (sender, mut receiver) = oneshot::channel();
    let work = {
        let reader = Arc::clone(reader);
        let writer = Arc::clone(writer);
        let key = key.to_owned();
        move || populate(reader, writer, key, expire, query, sender)
    };

    let (outcome, fresh) = reader.flight().run(key, work).await;
    let raw = outcome?;

    if fresh {
        if let Ok(value) = receiver.try_recv() {
            return Ok(value);
        }
    } else {
        // Waiters that shared another caller's result count as one request and one hit
        // each, once the shared result is known to be good.
        reader.stat().increment_total();
        reader.stat().increment_hit();
    }

    codec::decode(&raw)
}

async fn populate<T, R, W, F, Fut, E>(
    reader: Arc<R>,
    writer: Arc<W>,
    key: String,
    expire: Duration,
    query: F,
    decoded: oneshot::Sender<T>,
) -> Result<Bytes, Error>
where
    T: Serialize + DeserializeOwned,
    R: Node,
    W: Node,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: Into<Box<dyn StdError + Send + Sync>> + 'static,
{
    match lookup::<T, _, _>(&*reader, &*writer, &key).await? {
        Lookup::Hit { value, raw } => {
            drop(decoded.send(value));
            return Ok(raw);
        }
        Lookup::Placeholder => return Err(Error::NotFound),
        Lookup::Miss => {}
    }

    let answer: Result<Option<T>, Box<dyn StdError + Send + Sync>> = query().await.map_err(Into::into);
    match answer {
        Ok(Some(value)) => {
            let raw = codec::encode(&value)?;
            if let Err(e) = writer.set_raw(&key, raw.clone(), expire).await {
                tracing::error!(cache.node = writer.name(), cache.key = %key, error = %e, "failed to populate cache");
            }
            drop(decoded.send(value));
            Ok(raw)
        }
        Ok(None) => {
            let placeholder = Bytes::from_static(codec::NOT_FOUND_PLACEHOLDER);
            if let Err(e) = writer.set_raw(&key, placeholder, writer.not_found_expiry()).await {
                tracing::error!(cache.node = writer.name(), cache.key = %key, error = %e, "failed to set not-found placeholder");
            }
            Err(Error::NotFound)
        }
        Err(e) => {
            reader.stat().increment_db_fails();
            Err(Error::query(e))
        }
    }
}
