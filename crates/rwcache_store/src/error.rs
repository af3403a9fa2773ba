// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for store operations.

use std::sync::Arc;

/// An error from a store operation.
///
/// This is an opaque, cloneable error that wraps whatever the underlying store reported.
/// Use [`std::error::Error::source()`] to reach the original cause.
///
/// # Example
///
/// ```
/// use rwcache_store::Error;
///
/// let error = Error::from_message("connection refused");
/// assert_eq!(error.to_string(), "connection refused");
/// ```
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    message: String,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates an error that carries only a message.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error caused by another error, keeping it as the source.
    pub fn caused_by<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: cause.to_string(),
            source: Some(Arc::new(cause)),
        }
    }
}

/// A specialized [`Result`] type for store operations.
pub type Result<T> = std::result::Result<T, Error>;
