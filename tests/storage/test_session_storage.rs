// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Namespacing and typed values over a raw string store

use ethers::types::U256;
use fhevm_session::storage::codec;
use fhevm_session::{MemoryStorage, SessionStorage, StorageAdapter, StorageError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Balance {
    #[serde(with = "codec::bigint")]
    amount: U256,
    #[serde(with = "codec::bytes")]
    proof: Vec<u8>,
}

fn balance() -> Balance {
    Balance {
        amount: U256::MAX,
        proof: vec![0xde, 0xad],
    }
}

#[tokio::test]
async fn test_keys_are_namespaced() {
    let memory = MemoryStorage::new();
    let storage = SessionStorage::new(Arc::new(memory.clone()), "dapp");

    storage.set("balance", &balance()).await.unwrap();

    assert_eq!(memory.keys().await, vec!["dapp.balance".to_string()]);
    assert_eq!(storage.get::<Balance>("balance").await.unwrap(), Some(balance()));
}

#[tokio::test]
async fn test_big_integers_and_bytes_are_tagged() {
    let memory = MemoryStorage::new();
    let storage = SessionStorage::new(Arc::new(memory.clone()), "dapp");
    storage.set("balance", &balance()).await.unwrap();

    let raw = memory.get_item("dapp.balance").await.unwrap().unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["amount"]["__type"], "bigint");
    assert_eq!(json["amount"]["value"], U256::MAX.to_string());
    assert_eq!(json["proof"]["__type"], "bytes");
    assert_eq!(json["proof"]["value"], "0xdead");
}

#[tokio::test]
async fn test_undecodable_value_reads_as_absent() {
    let memory = MemoryStorage::new();
    memory
        .set_item("dapp.balance", "{not json".to_string())
        .await
        .unwrap();

    let storage = SessionStorage::new(Arc::new(memory), "dapp");
    assert_eq!(storage.get::<Balance>("balance").await.unwrap(), None);
}

#[tokio::test]
async fn test_backend_errors_propagate() {
    let memory = MemoryStorage::new();
    let storage = SessionStorage::new(Arc::new(memory.clone()), "dapp");

    memory
        .inject_error(StorageError::Backend("disk unavailable".to_string()))
        .await;
    assert!(storage.get::<Balance>("balance").await.is_err());

    memory.set_fail_writes(true).await;
    assert_eq!(
        storage.set("balance", &balance()).await.unwrap_err(),
        StorageError::QuotaExceeded
    );
}
