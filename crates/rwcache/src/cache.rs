// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{error::Error as StdError, fmt::Debug, sync::Arc, time::Duration};

use rwcache_store::Store;
use serde::{Serialize, de::DeserializeOwned};

use crate::{Dispatcher, Error, Node, ReadWriteCacheBuilder, aside, codec, stat::Reporter};

/// A cache-aside layer over one write node and a set of read nodes.
///
/// Writes and deletes always go to the write node. Reads go to the read node that the
/// dispatcher picks for the key. Values fetched by [`take`](Self::take) are written back
/// through the write node, so read nodes catch up through store replication.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use rwcache::{Error, MemoryStore, ReadWriteCache};
/// # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
///
/// let store = Arc::new(MemoryStore::new("memory"));
/// let cache = ReadWriteCache::builder().writer(Arc::clone(&store)).reader(store).build()?;
///
/// cache.set("user:1", "ada").await?;
/// let name: String = cache.get("user:1").await?;
/// assert_eq!(name, "ada");
///
/// let name: String = cache
///     .take("user:2", || async { Ok::<_, Error>(Some("grace".to_string())) })
///     .await?;
/// assert_eq!(name, "grace");
/// # Ok::<(), Error>(())
/// # }).unwrap();
/// ```
pub struct ReadWriteCache<N> {
    writer: Arc<N>,
    dispatcher: Box<dyn Dispatcher<N>>,
    _reporter: Option<Reporter>,
}

impl<N: Debug> Debug for ReadWriteCache<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadWriteCache")
            .field("writer", &self.writer)
            .field("reporting", &self._reporter.is_some())
            .finish_non_exhaustive()
    }
}

impl ReadWriteCache<()> {
    /// Starts building a cache over stores of type `S`.
    #[must_use]
    pub fn builder<S: Store>() -> ReadWriteCacheBuilder<S> {
        ReadWriteCacheBuilder::new()
    }
}

impl<N: Node> ReadWriteCache<N> {
    /// Creates a cache from a write node and a dispatcher over read nodes.
    ///
    /// Most callers use [`ReadWriteCache::builder`] instead.
    pub fn new(writer: Arc<N>, dispatcher: impl Dispatcher<N> + 'static) -> Self {
        Self {
            writer,
            dispatcher: Box::new(dispatcher),
            _reporter: None,
        }
    }

    pub(crate) fn with_reporter(mut self, reporter: Reporter) -> Self {
        self._reporter = Some(reporter);
        self
    }

    /// Returns the write node.
    #[must_use]
    pub fn writer(&self) -> &Arc<N> {
        &self.writer
    }

    /// Returns the read node serving `key`.
    #[must_use]
    pub fn reader_for(&self, key: &str) -> Option<&Arc<N>> {
        self.dispatcher.pick(key)
    }

    fn reader(&self, key: &str) -> Result<&Arc<N>, Error> {
        self.dispatcher.pick(key).ok_or(Error::NotFound)
    }

    /// Reads `key` from its read node, without falling back to the system of record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the key is absent or marked as absent, and
    /// [`Error::Store`] if the read node fails.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, Error> {
        let reader = self.reader(key)?;
        aside::get(&**reader, &*self.writer, key).await
    }

    /// Writes `value` under `key` through the write node with the default expiry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if the value cannot be encoded and [`Error::Store`] if the
    /// write node fails.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), Error> {
        self.set_with_expire(key, value, self.writer.expiry()).await
    }

    /// Writes `value` under `key` through the write node, expiring after `expire`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if the value cannot be encoded and [`Error::Store`] if the
    /// write node fails.
    pub async fn set_with_expire<T: Serialize + ?Sized>(&self, key: &str, value: &T, expire: Duration) -> Result<(), Error> {
        let raw = codec::encode(value)?;
        self.writer.set_raw(key, raw, expire).await
    }

    /// Deletes `keys` through the write node.
    ///
    /// Never fails: failed deletes are logged and retried in the background.
    pub async fn delete<K: AsRef<str>>(&self, keys: &[K]) {
        let keys: Vec<String> = keys.iter().map(|key| key.as_ref().to_owned()).collect();
        self.writer.delete(&keys).await;
    }

    /// Reads `key`, or fetches it with `query` and caches the answer.
    ///
    /// `query` answers `Ok(Some(value))` for a value, `Ok(None)` if the system of record has
    /// no such key, and `Err` if it failed. Absence is cached as a placeholder for the
    /// not-found expiry.
    ///
    /// Concurrent calls for the same key on the same read node run `query` once and share
    /// its answer. Dropping the returned future does not cancel a running `query`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the key is known to be absent;
    /// - [`Error::Store`] if the read node fails, without calling `query`;
    /// - [`Error::Query`] if `query` fails;
    /// - [`Error::Encode`] if the fetched value cannot be encoded.
    pub async fn take<T, F, Fut, E>(&self, key: &str, query: F) -> Result<T, Error>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync>> + 'static,
    {
        let reader = self.reader(key)?;
        aside::take(reader, &self.writer, key, self.writer.expiry(), query).await
    }

    /// Like [`take`](Self::take), but hands `query` the expiry the fetched value will be
    /// cached with.
    ///
    /// # Errors
    ///
    /// Same as [`take`](Self::take).
    pub async fn take_with_expire<T, F, Fut, E>(&self, key: &str, query: F) -> Result<T, Error>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(Duration) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync>> + 'static,
    {
        let reader = self.reader(key)?;
        let expire = self.writer.expiry();
        aside::take(reader, &self.writer, key, expire, move || query(expire)).await
    }

    /// Returns `true` if `error` reports an absent key.
    #[must_use]
    pub fn is_not_found(&self, error: &Error) -> bool {
        error.is_not_found()
    }
}
