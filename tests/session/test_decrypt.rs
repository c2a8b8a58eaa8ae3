// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! User decryption through the session

use crate::common::{harness, sample_metadata, FakeRpc, Harness, MockSigner, WalletSigner};
use ethers::types::{Address, U256};
use fhevm_session::auth::cache_key;
use fhevm_session::config::SEPOLIA_CHAIN_ID;
use fhevm_session::engine::mock::MockEngine;
use fhevm_session::session::user_decrypt;
use fhevm_session::{
    AuthorizationOptions, CancellationToken, CipherEngine, ClearValue,
    DecryptionAuthorizationManager, DecryptionSignature, EngineHandle, EngineKind, ExternalError,
    FheValue, HandleContractPair, MemoryStorage, SessionError, SessionStatus, SessionStorage,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

const CONTRACT: Address = Address::repeat_byte(0xc1);
const OTHER_CONTRACT: Address = Address::repeat_byte(0xc2);

async fn ready_on_sepolia() -> Harness {
    let h = harness().await;
    let (_, connection) = FakeRpc::production(SEPOLIA_CHAIN_ID).connect();
    h.session
        .create_instance(connection, &CancellationToken::new())
        .await
        .unwrap();
    h
}

async fn encrypt_for(
    h: &Harness,
    contract: Address,
    user: Address,
    values: &[FheValue],
) -> Vec<String> {
    let encrypted = h.session.encrypt(contract, user, values).await.unwrap();
    (0..encrypted.handles.len())
        .map(|i| encrypted.handle_hex(i).unwrap())
        .collect()
}

#[tokio::test]
async fn test_empty_request_makes_no_calls() {
    let h = ready_on_sepolia().await;
    let calls_before = h.memory.calls().await;
    // Any call on this signer would panic
    let signer = MockSigner::new();

    let values = h.session.decrypt(&[], &signer).await.unwrap();

    assert!(values.is_empty());
    assert_eq!(h.memory.calls().await, calls_before);
    assert_eq!(h.factory.last_engine().total_calls(), 0);
}

#[tokio::test]
async fn test_decrypt_returns_engine_values() {
    let h = ready_on_sepolia().await;
    let signer = WalletSigner::random();
    let handles = encrypt_for(
        &h,
        CONTRACT,
        signer.address(),
        &[FheValue::Uint64(1_000), FheValue::Address(Address::repeat_byte(7))],
    )
    .await;

    let requests: Vec<HandleContractPair> = handles
        .iter()
        .map(|handle| HandleContractPair::new(handle.clone(), CONTRACT))
        .collect();
    let values = h.session.decrypt(&requests, &signer).await.unwrap();

    assert_eq!(values.len(), 2);
    assert_eq!(values[&handles[0]], ClearValue::Uint(U256::from(1_000u64)));
    assert_eq!(values[&handles[1]], ClearValue::Address(Address::repeat_byte(7)));
    assert_eq!(h.factory.last_engine().decrypt_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_second_decrypt_reuses_signature() {
    let h = ready_on_sepolia().await;
    let signer = WalletSigner::random();
    let handles = encrypt_for(&h, CONTRACT, signer.address(), &[FheValue::Bool(true)]).await;
    let requests = vec![HandleContractPair::new(handles[0].clone(), CONTRACT)];

    h.session.decrypt(&requests, &signer).await.unwrap();
    h.session.decrypt(&requests, &signer).await.unwrap();

    assert_eq!(signer.prompts(), 1);
}

#[tokio::test]
async fn test_engine_error_rethrown_as_same_object() {
    let h = ready_on_sepolia().await;
    let signer = WalletSigner::random();
    let failure = ExternalError::msg("kms threshold not reached");
    h.factory.last_engine().fail_decryptions_with(failure.clone());

    let requests = vec![HandleContractPair::new(format!("0x{}", "ab".repeat(32)), CONTRACT)];
    let err = h.session.decrypt(&requests, &signer).await.unwrap_err();

    assert!(err.as_external().unwrap().ptr_eq(&failure));
    let state = h.session.state();
    assert_eq!(state.status, SessionStatus::Error);
    assert!(state.last_error.unwrap().as_external().unwrap().ptr_eq(&failure));
}

#[tokio::test]
async fn test_rejected_signature_is_signature_error() {
    let h = ready_on_sepolia().await;
    let signer = WalletSigner::random();
    signer.reject.store(true, Ordering::SeqCst);

    let requests = vec![HandleContractPair::new(format!("0x{}", "ab".repeat(32)), CONTRACT)];
    let err = h.session.decrypt(&requests, &signer).await.unwrap_err();

    match &err {
        SessionError::SignatureError { signer: address } => {
            assert_eq!(*address, Some(signer.address()))
        }
        other => panic!("expected SignatureError, got {:?}", other),
    }
    assert_eq!(h.factory.last_engine().decrypt_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.session.state().status, SessionStatus::Error);
}

#[tokio::test]
async fn test_signer_without_address_is_signature_error() {
    let h = ready_on_sepolia().await;
    let mut signer = MockSigner::new();
    signer
        .expect_address()
        .returning(|| Err(ExternalError::msg("no account")));
    signer.expect_sign_typed_data().never();

    let requests = vec![HandleContractPair::new(format!("0x{}", "ab".repeat(32)), CONTRACT)];
    let err = h.session.decrypt(&requests, &signer).await.unwrap_err();
    assert_eq!(err.code(), "SIGNATURE_ERROR");
}

#[tokio::test]
async fn test_signature_not_covering_request_is_mismatch() {
    let h = ready_on_sepolia().await;
    let signer = WalletSigner::random();

    // Entry stored under the {CONTRACT, OTHER} key but only signed for CONTRACT
    let narrow = DecryptionSignature::new(
        h.factory.last_engine().inner.generate_keypair().unwrap(),
        vec![0x1b; 65],
        &[CONTRACT],
        signer.address(),
        chrono::Utc::now().timestamp() as u64,
        1,
    );
    SessionStorage::new(Arc::new(h.memory.clone()), "fhevm")
        .set(&cache_key(signer.address(), &[CONTRACT, OTHER_CONTRACT]), &narrow)
        .await
        .unwrap();

    let requests = vec![
        HandleContractPair::new(format!("0x{}", "ab".repeat(32)), CONTRACT),
        HandleContractPair::new(format!("0x{}", "cd".repeat(32)), OTHER_CONTRACT),
    ];
    let err = h.session.decrypt(&requests, &signer).await.unwrap_err();

    match err {
        SessionError::SignatureMismatch { missing } => assert_eq!(missing, vec![OTHER_CONTRACT]),
        other => panic!("expected SignatureMismatch, got {:?}", other),
    }
    assert_eq!(signer.prompts(), 0);
}

#[tokio::test]
async fn test_expired_signature_is_not_renewed() {
    let engine = EngineHandle::new(
        31337,
        EngineKind::Mock,
        Arc::new(MockEngine::new(31337, sample_metadata())),
    );
    let authorization = DecryptionAuthorizationManager::new(
        SessionStorage::new(Arc::new(MemoryStorage::new()), "fhevm"),
        AuthorizationOptions { validity_days: 0 },
    );
    let signer = WalletSigner::random();
    let requests = vec![HandleContractPair::new(format!("0x{}", "ab".repeat(32)), CONTRACT)];

    let err = user_decrypt(&engine, &authorization, &requests, &signer)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "SIGNATURE_EXPIRED");
    assert_eq!(signer.prompts(), 1);
}

#[tokio::test]
async fn test_malformed_handle_fails_before_engine_call() {
    let h = ready_on_sepolia().await;
    let signer = WalletSigner::random();

    let requests = vec![HandleContractPair::new(format!("not0x{}", "a".repeat(62)), CONTRACT)];
    let err = h.session.decrypt(&requests, &signer).await.unwrap_err();

    match &err {
        SessionError::InvalidHandle { reason, .. } => assert_eq!(reason, "must start with 0x"),
        other => panic!("expected InvalidHandle, got {:?}", other),
    }
    assert_eq!(h.factory.last_engine().decrypt_calls.load(Ordering::SeqCst), 0);

    let requests = vec![HandleContractPair::new(format!("0x{}", "Z".repeat(64)), CONTRACT)];
    let err = h.session.decrypt(&requests, &signer).await.unwrap_err();
    assert!(err.to_string().contains("must be valid hex"));
}

#[tokio::test]
async fn test_short_handle_still_reaches_engine() {
    let h = ready_on_sepolia().await;
    let signer = WalletSigner::random();

    let requests = vec![HandleContractPair::new("0x1234", CONTRACT)];
    let err = h.session.decrypt(&requests, &signer).await.unwrap_err();

    // The handle passed validation; the engine rejects it as unknown
    assert_eq!(err.code(), "EXTERNAL");
    assert_eq!(h.factory.last_engine().decrypt_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_decrypt_without_engine_is_not_ready() {
    let h = harness().await;
    let signer = WalletSigner::random();

    let requests = vec![HandleContractPair::new(format!("0x{}", "ab".repeat(32)), CONTRACT)];
    let err = h.session.decrypt(&requests, &signer).await.unwrap_err();

    assert_eq!(err.code(), "ENGINE_NOT_READY");
    assert_eq!(signer.prompts(), 0);
}
