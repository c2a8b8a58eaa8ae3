// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Quota exceeded")]
    QuotaExceeded,
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

/// Minimal string key-value capability the session layer persists through.
///
/// Implementations may complete immediately (in-memory maps) or perform real I/O
/// (files, remote stores); callers always await.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError>;
    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

#[async_trait]
impl<T: StorageAdapter + ?Sized> StorageAdapter for Arc<T> {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get_item(key).await
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        (**self).set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove_item(key).await
    }
}

/// In-memory storage with error injection and call accounting for tests
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: Arc<Mutex<HashMap<String, String>>>,
    injected_error: Arc<Mutex<Option<StorageError>>>,
    fail_writes: Arc<Mutex<bool>>,
    calls: Arc<Mutex<StorageCalls>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageCalls {
    pub gets: usize,
    pub sets: usize,
    pub removes: usize,
}

impl StorageCalls {
    pub fn total(&self) -> usize {
        self.gets + self.sets + self.removes
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call with `error`
    pub async fn inject_error(&self, error: StorageError) {
        *self.injected_error.lock().await = Some(error);
    }

    /// Make every `set_item` fail until reset
    pub async fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().await = fail;
    }

    pub async fn calls(&self) -> StorageCalls {
        self.calls.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.items.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    async fn check_injected_error(&self) -> Result<(), StorageError> {
        let mut error_opt = self.injected_error.lock().await;
        if let Some(error) = error_opt.take() {
            return Err(error);
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.calls.lock().await.gets += 1;
        self.check_injected_error().await?;

        let items = self.items.lock().await;
        Ok(items.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.calls.lock().await.sets += 1;
        self.check_injected_error().await?;
        if *self.fail_writes.lock().await {
            return Err(StorageError::QuotaExceeded);
        }

        let mut items = self.items.lock().await;
        items.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.calls.lock().await.removes += 1;
        self.check_injected_error().await?;

        let mut items = self.items.lock().await;
        items.remove(key);
        Ok(())
    }
}

/// Storage that keeps nothing; used while rendering on a server
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStorage;

#[async_trait]
impl StorageAdapter for NoopStorage {
    async fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Ok(None)
    }

    async fn set_item(&self, _key: &str, _value: String) -> Result<(), StorageError> {
        Ok(())
    }

    async fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
        Ok(())
    }
}
