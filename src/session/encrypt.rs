// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::Session;
use crate::engine::{EncryptedInputBuilder, EncryptedInputs, FheValue};
use crate::error::SessionError;
use ethers::types::Address;
use tracing::debug;

impl Session {
    /// Encrypt `values` as one input for `contract_address`, on behalf of `user_address`
    pub async fn encrypt(
        &self,
        contract_address: Address,
        user_address: Address,
        values: &[FheValue],
    ) -> Result<EncryptedInputs, SessionError> {
        let result = self.encrypt_inner(contract_address, user_address, values).await;
        self.record("encrypt", result).await
    }

    /// Builder for adding values one by one on the ready engine
    pub fn encrypted_input(
        &self,
        contract_address: Address,
        user_address: Address,
    ) -> Result<Box<dyn EncryptedInputBuilder>, SessionError> {
        let engine = self.ready_engine()?;
        Ok(engine
            .engine()
            .build_encrypted_input(contract_address, user_address))
    }

    async fn encrypt_inner(
        &self,
        contract_address: Address,
        user_address: Address,
        values: &[FheValue],
    ) -> Result<EncryptedInputs, SessionError> {
        let mut input = self.encrypted_input(contract_address, user_address)?;
        for value in values {
            input.add(*value)?;
        }

        let encrypted = input.encrypt().await?;
        debug!(
            contract = ?contract_address,
            handles = encrypted.handles.len(),
            proof_bytes = encrypted.input_proof.len(),
            "Encrypted input"
        );
        Ok(encrypted)
    }
}
