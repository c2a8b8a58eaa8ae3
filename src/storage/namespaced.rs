// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::adapter::{StorageAdapter, StorageError};
use super::codec;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

pub const DEFAULT_STORAGE_PREFIX: &str = "fhevm";

/// Namespaced, typed view over a [`StorageAdapter`].
///
/// Every key is stored as `<prefix>.<key>`. Values go through [`codec`], so fields
/// marked with the `bigint`/`bytes` helpers round-trip through plain strings.
#[derive(Clone)]
pub struct SessionStorage {
    adapter: Arc<dyn StorageAdapter>,
    prefix: String,
}

impl SessionStorage {
    pub fn new(adapter: Arc<dyn StorageAdapter>, prefix: impl Into<String>) -> Self {
        Self {
            adapter,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn adapter(&self) -> &Arc<dyn StorageAdapter> {
        &self.adapter
    }

    pub fn full_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.prefix, key)
        }
    }

    /// Read and decode a value. A value that no longer decodes counts as absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let full_key = self.full_key(key);
        let Some(raw) = self.adapter.get_item(&full_key).await? else {
            return Ok(None);
        };

        match codec::decode::<T>(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key = %full_key, error = %e, "Discarding undecodable stored value");
                Ok(None)
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = codec::encode(value)?;
        self.adapter.set_item(&self.full_key(key), raw).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.adapter.remove_item(&self.full_key(key)).await
    }
}

impl std::fmt::Debug for SessionStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStorage")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
