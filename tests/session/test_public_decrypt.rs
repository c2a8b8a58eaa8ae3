// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Public decryption through the session

use crate::common::{harness, FakeRpc, Harness};
use ethers::types::{Address, U256};
use fhevm_session::config::SEPOLIA_CHAIN_ID;
use fhevm_session::{CancellationToken, ClearValue, FheValue, SessionStatus};
use std::sync::atomic::Ordering;

async fn ready_on_sepolia() -> Harness {
    let h = harness().await;
    let (_, connection) = FakeRpc::production(SEPOLIA_CHAIN_ID).connect();
    h.session
        .create_instance(connection, &CancellationToken::new())
        .await
        .unwrap();
    h
}

#[tokio::test]
async fn test_public_handles_decrypt_without_signature() {
    let h = ready_on_sepolia().await;
    let engine = h.factory.last_engine();
    let handle = engine.inner.seal(FheValue::Uint16(512), &[]);
    engine.inner.make_publicly_decryptable(&handle).unwrap();

    let values = h.session.public_decrypt(&[handle.clone()]).await.unwrap();
    assert_eq!(values[&handle], ClearValue::Uint(U256::from(512u64)));
}

#[tokio::test]
async fn test_private_handle_rejected_by_engine() {
    let h = ready_on_sepolia().await;
    let handle = h
        .factory
        .last_engine()
        .inner
        .seal(FheValue::Bool(true), &[Address::repeat_byte(0xee)]);

    let err = h.session.public_decrypt(&[handle]).await.unwrap_err();
    assert_eq!(err.code(), "EXTERNAL");
    assert_eq!(h.session.state().status, SessionStatus::Error);
}

#[tokio::test]
async fn test_empty_and_malformed_requests() {
    let h = ready_on_sepolia().await;
    let engine = h.factory.last_engine();

    assert!(h.session.public_decrypt(&[]).await.unwrap().is_empty());

    let err = h
        .session
        .public_decrypt(&["".to_string()])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("must be a non-empty string"));
    assert_eq!(engine.decrypt_calls.load(Ordering::SeqCst), 0);
}
