// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Durable `{activeChainId}` projection

use crate::common::registry;
use fhevm_session::config::{HARDHAT_CHAIN_ID, SEPOLIA_CHAIN_ID};
use fhevm_session::{
    ConfigStore, MemoryStorage, SessionError, SessionStatus, SessionStorage, StorageAdapter,
};
use async_trait::async_trait;
use fhevm_session::StorageError;
use std::sync::Arc;
use std::time::Duration;

fn storage(memory: &MemoryStorage) -> SessionStorage {
    SessionStorage::new(Arc::new(memory.clone()), "fhevm")
}

#[tokio::test]
async fn test_only_active_chain_is_persisted() {
    let memory = MemoryStorage::new();
    let store = ConfigStore::create(registry(), storage(&memory), false)
        .await
        .unwrap();

    store
        .update(|state| state.loading(HARDHAT_CHAIN_ID).failed(SessionError::Aborted))
        .await;

    let raw = memory.get_item("fhevm.store").await.unwrap().unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"state": {"activeChainId": HARDHAT_CHAIN_ID}, "version": 1})
    );
}

#[tokio::test]
async fn test_restart_restores_chain_but_not_engine_or_error() {
    let memory = MemoryStorage::new();
    {
        let store = ConfigStore::create(registry(), storage(&memory), false)
            .await
            .unwrap();
        store
            .update(|state| state.loading(HARDHAT_CHAIN_ID).failed(SessionError::Aborted))
            .await;
    }

    let store = ConfigStore::create(registry(), storage(&memory), false)
        .await
        .unwrap();
    let state = store.state();
    assert_eq!(state.active_chain_id, HARDHAT_CHAIN_ID);
    assert_eq!(state.status, SessionStatus::Idle);
    assert!(state.last_error.is_none());
}

#[tokio::test]
async fn test_unconfigured_persisted_chain_falls_back_to_first_chain() {
    let memory = MemoryStorage::new();
    memory
        .set_item(
            "fhevm.store",
            r#"{"state":{"activeChainId":424242},"version":1}"#.to_string(),
        )
        .await
        .unwrap();

    let store = ConfigStore::create(registry(), storage(&memory), false)
        .await
        .unwrap();
    assert_eq!(store.state().active_chain_id, SEPOLIA_CHAIN_ID);
}

#[tokio::test]
async fn test_unknown_version_is_discarded() {
    let memory = MemoryStorage::new();
    memory
        .set_item(
            "fhevm.store",
            r#"{"state":{"activeChainId":31337},"version":99}"#.to_string(),
        )
        .await
        .unwrap();

    let store = ConfigStore::create(registry(), storage(&memory), false)
        .await
        .unwrap();
    assert_eq!(store.state().active_chain_id, SEPOLIA_CHAIN_ID);
}

#[tokio::test]
async fn test_corrupt_payload_uses_defaults() {
    let memory = MemoryStorage::new();
    memory
        .set_item("fhevm.store", "][".to_string())
        .await
        .unwrap();

    let store = ConfigStore::create(registry(), storage(&memory), false)
        .await
        .unwrap();
    assert_eq!(store.state().active_chain_id, SEPOLIA_CHAIN_ID);
    assert_eq!(store.state().status, SessionStatus::Idle);
}

#[tokio::test]
async fn test_write_failure_does_not_fail_update() {
    let memory = MemoryStorage::new();
    let store = ConfigStore::create(registry(), storage(&memory), false)
        .await
        .unwrap();
    memory.set_fail_writes(true).await;

    let state = store.update(|state| state.loading(HARDHAT_CHAIN_ID)).await;
    assert_eq!(state.status, SessionStatus::Loading);
    assert_eq!(store.state().active_chain_id, HARDHAT_CHAIN_ID);
}

#[tokio::test]
async fn test_ssr_store_loads_on_rehydrate() {
    let memory = MemoryStorage::new();
    memory
        .set_item(
            "fhevm.store",
            r#"{"state":{"activeChainId":31337},"version":1}"#.to_string(),
        )
        .await
        .unwrap();

    let store = ConfigStore::create(registry(), storage(&memory), true)
        .await
        .unwrap();
    assert_eq!(store.state().active_chain_id, SEPOLIA_CHAIN_ID);
    assert_eq!(memory.calls().await.gets, 0);

    assert!(store.rehydrate().await);
    assert_eq!(store.state().active_chain_id, HARDHAT_CHAIN_ID);
    assert!(!store.rehydrate().await);
}

/// Adapter whose writes mentioning the Hardhat chain are slow
struct SlowHardhatWrites {
    inner: MemoryStorage,
}

#[async_trait]
impl StorageAdapter for SlowHardhatWrites {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        if value.contains(&HARDHAT_CHAIN_ID.to_string()) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove_item(key).await
    }
}

#[tokio::test]
async fn test_overlapping_updates_persist_in_order() {
    let memory = MemoryStorage::new();
    let adapter = Arc::new(SlowHardhatWrites {
        inner: memory.clone(),
    });
    let store = ConfigStore::create(registry(), SessionStorage::new(adapter, "fhevm"), false)
        .await
        .unwrap();
    let watcher = store.watch();

    tokio::join!(
        store.update(|state| state.loading(HARDHAT_CHAIN_ID)),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            store.update(|state| state.loading(SEPOLIA_CHAIN_ID)).await
        }
    );

    assert_eq!(store.state().active_chain_id, SEPOLIA_CHAIN_ID);
    assert_eq!(watcher.borrow().active_chain_id, SEPOLIA_CHAIN_ID);

    let restarted = ConfigStore::create(registry(), storage(&memory), false)
        .await
        .unwrap();
    assert_eq!(restarted.state().active_chain_id, SEPOLIA_CHAIN_ID);
}
