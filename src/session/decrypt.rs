// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::handle::validate_handle;
use super::Session;
use crate::auth::DecryptionAuthorizationManager;
use crate::engine::{DecryptedValues, EngineHandle, HandleContractPair, UserDecryptRequest};
use crate::error::SessionError;
use crate::signer::SessionSigner;
use ethers::types::Address;
use tracing::debug;

impl Session {
    /// Decrypt `requests` as the user behind `signer`, in one engine call.
    ///
    /// An empty batch returns an empty map without touching the signer, storage or
    /// engine.
    pub async fn decrypt(
        &self,
        requests: &[HandleContractPair],
        signer: &dyn SessionSigner,
    ) -> Result<DecryptedValues, SessionError> {
        if requests.is_empty() {
            return Ok(DecryptedValues::new());
        }

        let result = match self.ready_engine() {
            Ok(engine) => user_decrypt(&engine, &self.authorization, requests, signer).await,
            Err(e) => Err(e),
        };
        self.record("decrypt", result).await
    }
}

/// User decryption against an explicit engine
pub async fn user_decrypt(
    engine: &EngineHandle,
    authorization: &DecryptionAuthorizationManager,
    requests: &[HandleContractPair],
    signer: &dyn SessionSigner,
) -> Result<DecryptedValues, SessionError> {
    if requests.is_empty() {
        return Ok(DecryptedValues::new());
    }

    let mut contracts: Vec<Address> = requests.iter().map(|r| r.contract_address).collect();
    contracts.sort_unstable();
    contracts.dedup();

    let signature = match authorization
        .load_or_create(engine.engine().as_ref(), &contracts, signer, None)
        .await?
    {
        Some(signature) => signature,
        None => {
            return Err(SessionError::SignatureError {
                signer: signer.address().await.ok(),
            })
        }
    };

    if !signature.is_valid() {
        return Err(SessionError::SignatureExpired {
            expired_at: signature.expires_at(),
        });
    }

    let missing = signature.missing(&contracts);
    if !missing.is_empty() {
        return Err(SessionError::SignatureMismatch { missing });
    }

    for request in requests {
        validate_handle(&request.handle)?;
    }

    let signature_hex = signature.signature_hex();
    debug!(
        chain_id = engine.chain_id(),
        handles = requests.len(),
        contracts = contracts.len(),
        "Requesting user decryption"
    );

    let values = engine
        .engine()
        .decrypt_as_user(UserDecryptRequest {
            handles: requests,
            private_key: &signature.private_key,
            public_key: &signature.public_key,
            signature: &signature_hex,
            contract_addresses: &signature.authorized_contracts,
            user_address: signature.signer_address,
            start_timestamp: signature.issued_at,
            duration_days: signature.validity_days,
        })
        .await?;
    Ok(values)
}
