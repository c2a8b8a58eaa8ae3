// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Storage Value Codec
//!
//! Values persisted through a [`StorageAdapter`](super::StorageAdapter) are plain JSON
//! strings. Two kinds of value do not survive plain JSON: integers wider than 53 bits and
//! raw byte buffers. Fields holding them opt into a tagged encoding:
//!
//! ```text
//! U256     -> {"__type":"bigint","value":"340282366920938463463374607431768211456"}
//! Vec<u8>  -> {"__type":"bytes","value":"0xdeadbeef"}
//! ```
//!
//! ```rust,ignore
//! #[derive(Serialize, Deserialize)]
//! struct Cached {
//!     #[serde(with = "fhevm_session::storage::codec::bytes")]
//!     public_key: Vec<u8>,
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const BIGINT_TAG: &str = "bigint";
const BYTES_TAG: &str = "bytes";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to encode value: {0}")]
    Encode(String),
    #[error("Failed to decode value: {0}")]
    Decode(String),
}

impl From<CodecError> for super::StorageError {
    fn from(err: CodecError) -> Self {
        super::StorageError::SerializationError(err.to_string())
    }
}

#[derive(Serialize, Deserialize)]
struct Tagged {
    #[serde(rename = "__type")]
    kind: String,
    value: String,
}

impl Tagged {
    fn expect_kind<E: serde::de::Error>(self, kind: &str) -> Result<String, E> {
        if self.kind != kind {
            return Err(E::custom(format!(
                "expected tagged '{}', found '{}'",
                kind, self.kind
            )));
        }
        Ok(self.value)
    }
}

pub fn encode<T: Serialize>(value: &T) -> Result<String, CodecError> {
    serde_json::to_string(value).map_err(|e| CodecError::Encode(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, CodecError> {
    serde_json::from_str(raw).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Tagged decimal encoding for `U256`
pub mod bigint {
    use super::*;
    use serde::de::Error as _;
    use ethers::types::U256;

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        Tagged {
            kind: BIGINT_TAG.to_string(),
            value: value.to_string(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let digits = Tagged::deserialize(deserializer)?.expect_kind::<D::Error>(BIGINT_TAG)?;
        U256::from_dec_str(&digits).map_err(|e| D::Error::custom(format!("bigint: {}", e)))
    }
}

/// Tagged `0x`-hex encoding for byte buffers
pub mod bytes {
    use super::*;
    use serde::de::Error as _;

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        Tagged {
            kind: BYTES_TAG.to_string(),
            value: format!("0x{}", hex::encode(value)),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = Tagged::deserialize(deserializer)?.expect_kind::<D::Error>(BYTES_TAG)?;
        let body = encoded.strip_prefix("0x").unwrap_or(&encoded);
        hex::decode(body).map_err(|e| D::Error::custom(format!("bytes: {}", e)))
    }
}
