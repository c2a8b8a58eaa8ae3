// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::handle::validate_handle;
use super::Session;
use crate::engine::DecryptedValues;
use crate::error::SessionError;
use tracing::debug;

impl Session {
    /// Decrypt handles that were made publicly decryptable. No signature is involved.
    pub async fn public_decrypt(
        &self,
        handles: &[String],
    ) -> Result<DecryptedValues, SessionError> {
        if handles.is_empty() {
            return Ok(DecryptedValues::new());
        }

        let result = self.public_decrypt_inner(handles).await;
        self.record("public_decrypt", result).await
    }

    async fn public_decrypt_inner(
        &self,
        handles: &[String],
    ) -> Result<DecryptedValues, SessionError> {
        for handle in handles {
            validate_handle(handle)?;
        }

        let engine = self.ready_engine()?;
        debug!(
            chain_id = engine.chain_id(),
            handles = handles.len(),
            "Requesting public decryption"
        );
        Ok(engine.engine().decrypt_public(handles).await?)
    }
}
