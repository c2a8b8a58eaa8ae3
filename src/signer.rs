// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Signing capability used to authorize decryptions.
//!
//! A signature request may wait on the user indefinitely and may be rejected; both
//! outcomes are reported through the returned future.

use crate::error::ExternalError;
use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip712::TypedData;
use ethers::types::Address;
use tracing::debug;

#[async_trait]
pub trait SessionSigner: Send + Sync {
    async fn address(&self) -> Result<Address, ExternalError>;

    /// Sign an EIP-712 payload, returning the 65-byte `r || s || v` signature
    async fn sign_typed_data(&self, payload: &TypedData) -> Result<Vec<u8>, ExternalError>;
}

#[async_trait]
impl SessionSigner for LocalWallet {
    async fn address(&self) -> Result<Address, ExternalError> {
        Ok(Signer::address(self))
    }

    async fn sign_typed_data(&self, payload: &TypedData) -> Result<Vec<u8>, ExternalError> {
        let signature = Signer::sign_typed_data(self, payload)
            .await
            .map_err(ExternalError::new)?;
        debug!(signer = %Signer::address(self), "Signed EIP-712 payload");
        Ok(signature.to_vec())
    }
}
