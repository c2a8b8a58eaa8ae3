// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::adapter::{StorageAdapter, StorageError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// File-based storage: one file per key under `base_path`.
///
/// File names are the hex encoding of the key, so any key string is accepted
/// and two keys never share a file.
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn item_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", hex::encode(key)))
    }

    async fn ensure_dir(&self) -> Result<(), StorageError> {
        if !self.base_path.exists() {
            fs::create_dir_all(&self.base_path).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for FileStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.item_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let mut file = fs::File::open(&path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;
        Ok(Some(contents))
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("Empty key".to_string()));
        }
        self.ensure_dir().await?;

        let path = self.item_path(key);

        // Write atomically using a temp file
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(value.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(temp_path, path).await?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let path = self.item_path(key);
        if path.exists() {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }
}
