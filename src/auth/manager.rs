// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::artifact::{cache_key, normalize_contracts, now_seconds, DecryptionSignature};
use crate::config::DEFAULT_SIGNATURE_VALIDITY_DAYS;
use crate::engine::{CipherEngine, KeyPair};
use crate::error::SessionError;
use crate::signer::SessionSigner;
use crate::storage::SessionStorage;
use ethers::types::Address;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationOptions {
    /// Lifetime of newly created signatures
    pub validity_days: u32,
}

impl Default for AuthorizationOptions {
    fn default() -> Self {
        Self {
            validity_days: DEFAULT_SIGNATURE_VALIDITY_DAYS,
        }
    }
}

/// Creates, caches and retrieves decryption signatures so a user signs once per
/// contract set rather than once per decryption.
#[derive(Debug, Clone)]
pub struct DecryptionAuthorizationManager {
    storage: SessionStorage,
    options: AuthorizationOptions,
}

impl DecryptionAuthorizationManager {
    pub fn new(storage: SessionStorage, options: AuthorizationOptions) -> Self {
        Self { storage, options }
    }

    pub fn options(&self) -> AuthorizationOptions {
        self.options
    }

    pub fn cache_key(&self, signer: Address, contracts: &[Address]) -> String {
        cache_key(signer, contracts)
    }

    /// Stored signature for the pair, expired or not. Unreadable entries count as absent.
    pub async fn load(
        &self,
        signer: Address,
        contracts: &[Address],
    ) -> Option<DecryptionSignature> {
        let key = cache_key(signer, contracts);
        match self.storage.get::<DecryptionSignature>(&key).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read stored decryption signature");
                None
            }
        }
    }

    /// Unexpired stored signature for `contracts`, or a freshly signed one. Coverage of
    /// the stored signature is checked by the caller.
    ///
    /// Returns `Ok(None)` when the signer cannot report its address or refuses to
    /// sign. Engine failures while preparing the request are returned as they are.
    /// `key_pair` replaces the generated ephemeral key pair when given.
    pub async fn load_or_create(
        &self,
        engine: &dyn CipherEngine,
        contracts: &[Address],
        signer: &dyn SessionSigner,
        key_pair: Option<KeyPair>,
    ) -> Result<Option<DecryptionSignature>, SessionError> {
        let contracts = normalize_contracts(contracts);

        let signer_address = match signer.address().await {
            Ok(address) => address,
            Err(e) => {
                warn!(error = %e, "Signer did not provide an address");
                return Ok(None);
            }
        };

        let now = now_seconds();
        if let Some(stored) = self.load(signer_address, &contracts).await {
            if stored.is_valid_at(now) {
                debug!(
                    signer = ?signer_address,
                    contracts = contracts.len(),
                    expires_at = stored.expires_at(),
                    "Reusing stored decryption signature"
                );
                return Ok(Some(stored));
            }
            debug!(signer = ?signer_address, "Stored decryption signature expired");
        }

        let key_pair = match key_pair {
            Some(key_pair) => key_pair,
            None => engine.generate_keypair()?,
        };
        let validity_days = self.options.validity_days;
        let typed_data =
            engine.build_eip712(&key_pair.public_key, &contracts, now, validity_days)?;

        let signature = match signer.sign_typed_data(&typed_data).await {
            Ok(signature) => signature,
            Err(e) => {
                warn!(signer = ?signer_address, error = %e, "Signer rejected decryption authorization");
                return Ok(None);
            }
        };

        let artifact = DecryptionSignature::new(
            key_pair,
            signature,
            &contracts,
            signer_address,
            now,
            validity_days,
        );

        let key = cache_key(signer_address, &contracts);
        if let Err(e) = self.storage.set(&key, &artifact).await {
            warn!(key = %key, error = %e, "Failed to persist decryption signature");
        }

        info!(
            signer = ?signer_address,
            contracts = contracts.len(),
            validity_days,
            "Created decryption signature"
        );
        Ok(Some(artifact))
    }

    /// Forget the stored signature for the pair
    pub async fn clear(&self, signer: Address, contracts: &[Address]) -> Result<(), SessionError> {
        let key = cache_key(signer, contracts);
        self.storage.remove(&key).await?;
        debug!(key = %key, "Cleared decryption signature");
        Ok(())
    }
}
