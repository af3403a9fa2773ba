// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for cache operations.

use std::{error::Error as StdError, sync::Arc};

/// An error from a cache operation.
///
/// Errors are cloneable because one failed computation is shared by every caller that
/// waited on it.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The key does not exist, either in the cache or in the system of record.
    #[error("not found")]
    NotFound,

    /// The store behind a cache node failed.
    #[error("store `{node}` failed: {source}")]
    Store {
        /// Name of the node whose store failed.
        node: String,
        /// The store error.
        #[source]
        source: rwcache_store::Error,
    },

    /// The system of record failed to answer a query.
    #[error("query failed: {0}")]
    Query(#[source] Arc<dyn StdError + Send + Sync>),

    /// A value could not be encoded.
    #[error("failed to encode value: {0}")]
    Encode(#[source] Arc<serde_json::Error>),

    /// Stored bytes could not be decoded into the requested type.
    #[error("failed to decode value: {0}")]
    Decode(#[source] Arc<serde_json::Error>),

    /// The shared computation for a key panicked or was aborted before producing a result.
    #[error("shared computation aborted")]
    Aborted,

    /// The cache was configured incorrectly.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Returns `true` for [`Error::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Wraps a system-of-record failure.
    pub fn query(error: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Query(Arc::from(error.into()))
    }

    pub(crate) fn store(node: &str, source: rwcache_store::Error) -> Self {
        Self::Store {
            node: node.to_owned(),
            source,
        }
    }
}

/// A specialized [`Result`] type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;
