// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Key-value store abstraction for the `rwcache` read/write split cache.
//!
//! This crate defines the [`Store`] trait that every backing store must satisfy. A store
//! works on opaque byte payloads: encoding values is the caller's concern, as are
//! cache-aside semantics, stampede protection and negative caching. All of those live in
//! `rwcache`, which composes one or more stores into a cache.
//!
//! # Implementing a Store
//!
//! ```
//! use std::{collections::HashMap, sync::Mutex, time::Duration};
//!
//! use bytes::Bytes;
//! use rwcache_store::{Error, Store};
//!
//! struct NoExpiry(Mutex<HashMap<String, Bytes>>);
//!
//! impl Store for NoExpiry {
//!     fn addr(&self) -> &str {
//!         "local"
//!     }
//!
//!     async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
//!         Ok(self.0.lock().unwrap().get(key).cloned())
//!     }
//!
//!     async fn set_with_expire(&self, key: &str, value: Bytes, _expire: Duration) -> Result<(), Error> {
//!         self.0.lock().unwrap().insert(key.to_owned(), value);
//!         Ok(())
//!     }
//!
//!     async fn delete(&self, keys: &[String]) -> Result<u64, Error> {
//!         let mut map = self.0.lock().unwrap();
//!         Ok(keys.iter().filter(|key| map.remove(*key).is_some()).count() as u64)
//!     }
//! }
//! ```
//!
//! # Sharing Connections
//!
//! [`Registry`] owns one connection per address and hands out shared references, so
//! several cache nodes pointing at the same address reuse a single connection.

mod error;
mod memory;
mod registry;
mod store;
#[cfg(any(feature = "test-util", test))]
pub mod testing;

#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use memory::MemoryStore;
#[doc(inline)]
pub use registry::Registry;
#[doc(inline)]
pub use store::{Store, Topology, ttl_seconds};
