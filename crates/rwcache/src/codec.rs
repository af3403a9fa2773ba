// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Encoding of cached values.
//!
//! Values are stored as JSON. The negative-cache placeholder is the single byte `*`, which is
//! never a valid JSON document, so it cannot collide with a real value.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

use crate::Error;

pub(crate) const NOT_FOUND_PLACEHOLDER: &[u8] = b"*";

/// Encodes `value` into the bytes stored in the cache.
///
/// # Errors
///
/// Returns [`Error::Encode`] if the value cannot be represented as JSON, for example a map
/// with non-string keys.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, Error> {
    serde_json::to_vec(value).map(Bytes::from).map_err(|e| Error::Encode(Arc::new(e)))
}

/// Decodes bytes read from the cache.
///
/// # Errors
///
/// Returns [`Error::Decode`] if `raw` is not a valid encoding of `T`.
pub fn decode<T: DeserializeOwned>(raw: &[u8]) -> Result<T, Error> {
    serde_json::from_slice(raw).map_err(|e| Error::Decode(Arc::new(e)))
}

pub(crate) fn is_placeholder(raw: &[u8]) -> bool {
    raw == NOT_FOUND_PLACEHOLDER
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        id: u64,
        name: String,
    }

    #[test]
    fn encodes_as_json() {
        let raw = encode(&User { id: 42, name: "ada".into() }).unwrap();
        assert_eq!(&raw[..], br#"{"id":42,"name":"ada"}"#);
        assert_eq!(decode::<User>(&raw).unwrap(), User { id: 42, name: "ada".into() });
    }

    #[test]
    fn placeholder_never_decodes() {
        assert!(is_placeholder(NOT_FOUND_PLACEHOLDER));
        assert!(matches!(decode::<serde_json::Value>(NOT_FOUND_PLACEHOLDER), Err(Error::Decode(_))));
    }

    #[test]
    fn encoded_strings_are_not_placeholders() {
        let raw = encode("*").unwrap();
        assert_eq!(&raw[..], b"\"*\"");
        assert!(!is_placeholder(&raw));
    }

    #[test]
    fn non_string_map_keys_fail_to_encode() {
        let map = HashMap::from([((1, 2), "pair")]);
        assert!(matches!(encode(&map), Err(Error::Encode(_))));
    }

    #[test]
    fn wrong_shape_fails_to_decode() {
        assert!(matches!(decode::<User>(b"[1, 2, 3]"), Err(Error::Decode(_))));
    }
}
