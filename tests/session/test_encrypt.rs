// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Encrypted inputs through the session

use crate::common::{harness, FakeRpc};
use ethers::types::{Address, U256};
use fhevm_session::{CancellationToken, FheValue, SessionStatus};

#[tokio::test]
async fn test_encrypt_on_mock_chain() {
    let h = harness().await;
    let (_, connection) = FakeRpc::hardhat().connect();
    h.session
        .create_instance(connection, &CancellationToken::new())
        .await
        .unwrap();

    let encrypted = h
        .session
        .encrypt(
            Address::repeat_byte(0xc1),
            Address::repeat_byte(0xee),
            &[FheValue::Uint32(5), FheValue::Uint256(U256::from(9u64))],
        )
        .await
        .unwrap();

    assert_eq!(encrypted.handles.len(), 2);
    assert_eq!(encrypted.handle_hex(0).unwrap().len(), 66);
    assert_ne!(encrypted.handles[0], encrypted.handles[1]);
    // Handle count, signer count, then the handles
    assert_eq!(encrypted.input_proof.len(), 2 + 2 * 32);
    assert_eq!(encrypted.input_proof[0], 2);
}

#[tokio::test]
async fn test_builder_adds_values_one_by_one() {
    let h = harness().await;
    let (_, connection) = FakeRpc::hardhat().connect();
    h.session
        .create_instance(connection, &CancellationToken::new())
        .await
        .unwrap();

    let mut input = h
        .session
        .encrypted_input(Address::repeat_byte(0xc1), Address::repeat_byte(0xee))
        .unwrap();
    input.add(FheValue::Bool(false)).unwrap();
    let encrypted = input.encrypt().await.unwrap();
    assert_eq!(encrypted.handles.len(), 1);
}

#[tokio::test]
async fn test_encrypt_failure_recorded() {
    let h = harness().await;
    let (_, connection) = FakeRpc::hardhat().connect();
    h.session
        .create_instance(connection, &CancellationToken::new())
        .await
        .unwrap();

    // More than 2048 bits in one input
    let values = vec![FheValue::Uint256(U256::one()); 9];
    let err = h
        .session
        .encrypt(Address::repeat_byte(0xc1), Address::repeat_byte(0xee), &values)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "EXTERNAL");
    let state = h.session.state();
    assert_eq!(state.status, SessionStatus::Error);
    assert!(state.last_error.unwrap().same_as(&err));
}

#[tokio::test]
async fn test_encrypt_without_engine_is_not_ready() {
    let h = harness().await;
    let err = h
        .session
        .encrypt(Address::zero(), Address::zero(), &[FheValue::Uint8(1)])
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ENGINE_NOT_READY");
}
