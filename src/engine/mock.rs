// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Mock Cipher Engine
//!
//! Lightweight, non-cryptographic engine for local hardhat nodes running the FHEVM mock
//! plugin. Plaintexts live in an in-memory ciphertext table keyed by handle; handles are
//! keccak-derived and carry the chain id (bytes 21..29) and the FHE type (byte 30) the
//! way real FHEVM handles do.
//!
//! The engine still enforces the authorization rules a real relayer would: the
//! decryption signature must recover to the requesting user, must not be expired, and
//! must cover every contract in the batch; both the user and the contract must be
//! allowed on each handle.

use super::{
    CipherEngine, ClearValue, DecryptedValues, EncryptedInputBuilder, EncryptedInputs,
    FheValue, KeyPair, MockEngineFactory, UserDecryptRequest, HANDLE_BYTES,
};
use crate::digest::keccak256;
use crate::error::ExternalError;
use crate::rpc::{ChainRpc, RelayerMetadata};
use async_trait::async_trait;
use ethers::types::transaction::eip712::TypedData;
use ethers::types::{Address, Signature};
use k256::ecdsa::SigningKey;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

/// Maximum total bit width of one encrypted input
pub const MAX_INPUT_BITS: u32 = 2048;

/// Domain name of the user decryption EIP-712 payload
pub const DECRYPTION_DOMAIN_NAME: &str = "Decryption";
pub const USER_DECRYPT_PRIMARY_TYPE: &str = "UserDecryptRequestVerification";

const SECONDS_PER_DAY: u64 = 86_400;

/// Values per input; the proof stores the count in one byte
pub const MAX_INPUT_VALUES: usize = u8::MAX as usize;

#[derive(Debug, Error)]
pub enum MockEngineError {
    #[error("Unknown handle: {0}")]
    UnknownHandle(String),

    #[error("{account:?} is not allowed to decrypt {handle}")]
    NotAllowed { handle: String, account: Address },

    #[error("Handle {0} is not publicly decryptable")]
    NotPubliclyDecryptable(String),

    #[error("Invalid decryption signature: {0}")]
    InvalidSignature(String),

    #[error("Signature recovered to {recovered:?}, expected {expected:?}")]
    SignerMismatch {
        expected: Address,
        recovered: Address,
    },

    #[error("Contract {0:?} is not covered by the decryption request")]
    ContractNotAuthorized(Address),

    #[error("Decryption request expired at {expired_at}")]
    RequestExpired { expired_at: u64 },

    #[error("Encrypted input exceeds {max} bits (got {bits})")]
    InputTooLarge { bits: u32, max: u32 },

    #[error("Encrypted input has no values")]
    EmptyInput,

    #[error("Encrypted input exceeds {max} values")]
    TooManyValues { max: usize },

    #[error("EIP-712 payload error: {0}")]
    Eip712(String),
}

#[derive(Debug, Clone)]
struct Ciphertext {
    value: ClearValue,
    allowed: HashSet<Address>,
    public: bool,
}

#[derive(Debug, Default)]
struct Ledger {
    ciphertexts: Mutex<HashMap<String, Ciphertext>>,
    nonce: AtomicU64,
}

impl Ledger {
    fn with_ciphertexts<R>(&self, f: impl FnOnce(&mut HashMap<String, Ciphertext>) -> R) -> R {
        let mut table = self
            .ciphertexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut table)
    }
}

/// In-memory cipher engine for mock chains
#[derive(Debug, Clone)]
pub struct MockEngine {
    chain_id: u64,
    metadata: RelayerMetadata,
    ledger: Arc<Ledger>,
}

impl MockEngine {
    pub fn new(chain_id: u64, metadata: RelayerMetadata) -> Self {
        Self {
            chain_id,
            metadata,
            ledger: Arc::new(Ledger::default()),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn metadata(&self) -> &RelayerMetadata {
        &self.metadata
    }

    /// Store `value` under a fresh handle, readable by `allowed`
    pub fn seal(&self, value: FheValue, allowed: &[Address]) -> String {
        let nonce = self.ledger.nonce.fetch_add(1, Ordering::SeqCst);
        let seed = [
            b"mock-seal".as_slice(),
            &self.chain_id.to_be_bytes(),
            &nonce.to_be_bytes(),
        ]
        .concat();
        let handle = format!("0x{}", hex::encode(self.derive_handle(&seed, value.type_id())));
        self.ledger.with_ciphertexts(|table| {
            table.insert(
                handle.clone(),
                Ciphertext {
                    value: value.to_clear(),
                    allowed: allowed.iter().copied().collect(),
                    public: false,
                },
            )
        });
        handle
    }

    /// Grant `account` access to an existing handle
    pub fn allow(&self, handle: &str, account: Address) -> Result<(), MockEngineError> {
        self.ledger.with_ciphertexts(|table| {
            let ciphertext = table
                .get_mut(&normalize(handle))
                .ok_or_else(|| MockEngineError::UnknownHandle(handle.to_string()))?;
            ciphertext.allowed.insert(account);
            Ok(())
        })
    }

    pub fn make_publicly_decryptable(&self, handle: &str) -> Result<(), MockEngineError> {
        self.ledger.with_ciphertexts(|table| {
            let ciphertext = table
                .get_mut(&normalize(handle))
                .ok_or_else(|| MockEngineError::UnknownHandle(handle.to_string()))?;
            ciphertext.public = true;
            Ok(())
        })
    }

    pub fn ciphertext_count(&self) -> usize {
        self.ledger.with_ciphertexts(|table| table.len())
    }

    fn derive_handle(&self, seed: &[u8], type_id: u8) -> [u8; HANDLE_BYTES] {
        let mut handle = keccak256(seed);
        handle[21..29].copy_from_slice(&self.chain_id.to_be_bytes());
        handle[30] = type_id;
        handle[31] = 0;
        handle
    }

    fn verify_request(&self, request: &UserDecryptRequest<'_>) -> Result<(), MockEngineError> {
        let expired_at = request
            .start_timestamp
            .saturating_add(u64::from(request.duration_days).saturating_mul(SECONDS_PER_DAY));
        if now_seconds() >= expired_at {
            return Err(MockEngineError::RequestExpired { expired_at });
        }

        let typed = self
            .build_eip712(
                request.public_key,
                request.contract_addresses,
                request.start_timestamp,
                request.duration_days,
            )
            .map_err(|e| MockEngineError::Eip712(e.to_string()))?;
        let signature = Signature::from_str(request.signature)
            .map_err(|e| MockEngineError::InvalidSignature(e.to_string()))?;
        let recovered = signature
            .recover_typed_data(&typed)
            .map_err(|e| MockEngineError::InvalidSignature(e.to_string()))?;
        if recovered != request.user_address {
            return Err(MockEngineError::SignerMismatch {
                expected: request.user_address,
                recovered,
            });
        }

        for pair in request.handles {
            if !request.contract_addresses.contains(&pair.contract_address) {
                return Err(MockEngineError::ContractNotAuthorized(pair.contract_address));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CipherEngine for MockEngine {
    fn build_encrypted_input(
        &self,
        contract_address: Address,
        user_address: Address,
    ) -> Box<dyn EncryptedInputBuilder> {
        Box::new(MockEncryptedInput {
            engine: self.clone(),
            contract_address,
            user_address,
            values: Vec::new(),
            bits: 0,
        })
    }

    fn generate_keypair(&self) -> Result<KeyPair, ExternalError> {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let public_key = signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        Ok(KeyPair {
            public_key,
            private_key: signing_key.to_bytes().to_vec(),
        })
    }

    fn build_eip712(
        &self,
        public_key: &[u8],
        contract_addresses: &[Address],
        start_timestamp: u64,
        duration_days: u32,
    ) -> Result<TypedData, ExternalError> {
        let payload = serde_json::json!({
            "types": {
                "EIP712Domain": [
                    {"name": "name", "type": "string"},
                    {"name": "version", "type": "string"},
                    {"name": "chainId", "type": "uint256"},
                    {"name": "verifyingContract", "type": "address"}
                ],
                USER_DECRYPT_PRIMARY_TYPE: [
                    {"name": "publicKey", "type": "bytes"},
                    {"name": "contractAddresses", "type": "address[]"},
                    {"name": "startTimestamp", "type": "uint256"},
                    {"name": "durationDays", "type": "uint256"}
                ]
            },
            "primaryType": USER_DECRYPT_PRIMARY_TYPE,
            "domain": {
                "name": DECRYPTION_DOMAIN_NAME,
                "version": "1",
                "chainId": self.chain_id,
                "verifyingContract": self.metadata.kms_verifier_address,
            },
            "message": {
                "publicKey": format!("0x{}", hex::encode(public_key)),
                "contractAddresses": contract_addresses,
                "startTimestamp": start_timestamp.to_string(),
                "durationDays": duration_days.to_string(),
            }
        });

        serde_json::from_value(payload)
            .map_err(|e| ExternalError::new(MockEngineError::Eip712(e.to_string())))
    }

    async fn decrypt_as_user(
        &self,
        request: UserDecryptRequest<'_>,
    ) -> Result<DecryptedValues, ExternalError> {
        self.verify_request(&request).map_err(ExternalError::new)?;

        let values = self.ledger.with_ciphertexts(|table| -> Result<_, MockEngineError> {
            let mut values = DecryptedValues::new();
            for pair in request.handles {
                let ciphertext = table
                    .get(&normalize(&pair.handle))
                    .ok_or_else(|| MockEngineError::UnknownHandle(pair.handle.clone()))?;
                for account in [request.user_address, pair.contract_address] {
                    if !ciphertext.allowed.contains(&account) {
                        return Err(MockEngineError::NotAllowed {
                            handle: pair.handle.clone(),
                            account,
                        });
                    }
                }
                values.insert(pair.handle.clone(), ciphertext.value.clone());
            }
            Ok(values)
        });

        let values = values.map_err(ExternalError::new)?;
        debug!(
            chain_id = self.chain_id,
            count = values.len(),
            "Mock user decryption"
        );
        Ok(values)
    }

    async fn decrypt_public(&self, handles: &[String]) -> Result<DecryptedValues, ExternalError> {
        self.ledger
            .with_ciphertexts(|table| -> Result<_, MockEngineError> {
                let mut values = DecryptedValues::new();
                for handle in handles {
                    let ciphertext = table
                        .get(&normalize(handle))
                        .ok_or_else(|| MockEngineError::UnknownHandle(handle.clone()))?;
                    if !ciphertext.public {
                        return Err(MockEngineError::NotPubliclyDecryptable(handle.clone()));
                    }
                    values.insert(handle.clone(), ciphertext.value.clone());
                }
                Ok(values)
            })
            .map_err(ExternalError::new)
    }
}

/// Encrypted input collecting values for one (contract, user) pair
pub struct MockEncryptedInput {
    engine: MockEngine,
    contract_address: Address,
    user_address: Address,
    values: Vec<FheValue>,
    bits: u32,
}

#[async_trait]
impl EncryptedInputBuilder for MockEncryptedInput {
    fn add(&mut self, value: FheValue) -> Result<(), ExternalError> {
        if self.values.len() >= MAX_INPUT_VALUES {
            return Err(ExternalError::new(MockEngineError::TooManyValues {
                max: MAX_INPUT_VALUES,
            }));
        }
        let bits = self.bits + u32::from(value.bits());
        if bits > MAX_INPUT_BITS {
            return Err(ExternalError::new(MockEngineError::InputTooLarge {
                bits,
                max: MAX_INPUT_BITS,
            }));
        }
        self.bits = bits;
        self.values.push(value);
        Ok(())
    }

    async fn encrypt(self: Box<Self>) -> Result<EncryptedInputs, ExternalError> {
        if self.values.is_empty() {
            return Err(ExternalError::new(MockEngineError::EmptyInput));
        }

        let count = u8::try_from(self.values.len()).map_err(|_| {
            ExternalError::new(MockEngineError::TooManyValues {
                max: MAX_INPUT_VALUES,
            })
        })?;

        let engine = &self.engine;
        let nonce = engine.ledger.nonce.fetch_add(1, Ordering::SeqCst);
        let mut handles = Vec::with_capacity(self.values.len());
        let allowed: HashSet<Address> = [self.contract_address, self.user_address].into();

        engine.ledger.with_ciphertexts(|table| {
            for (index, value) in self.values.iter().enumerate() {
                let seed = [
                    b"mock-input".as_slice(),
                    &engine.chain_id.to_be_bytes(),
                    self.contract_address.as_bytes(),
                    self.user_address.as_bytes(),
                    &nonce.to_be_bytes(),
                    &(index as u64).to_be_bytes(),
                ]
                .concat();
                let handle = engine.derive_handle(&seed, value.type_id());
                table.insert(
                    format!("0x{}", hex::encode(handle)),
                    Ciphertext {
                        value: value.to_clear(),
                        allowed: allowed.clone(),
                        public: false,
                    },
                );
                handles.push(handle);
            }
        });

        // Proof layout: handle count, signer count, then the handles
        let mut input_proof = vec![count, 0];
        for handle in &handles {
            input_proof.extend_from_slice(handle);
        }

        debug!(
            contract = ?self.contract_address,
            count = handles.len(),
            "Mock encrypted input"
        );
        Ok(EncryptedInputs {
            handles,
            input_proof,
        })
    }
}

/// Default [`MockEngineFactory`]: one fresh [`MockEngine`] per mock chain
#[derive(Debug, Default, Clone, Copy)]
pub struct MockEngineProvider;

#[async_trait]
impl MockEngineFactory for MockEngineProvider {
    async fn create_mock_engine(
        &self,
        chain_id: u64,
        metadata: RelayerMetadata,
        _rpc: Arc<dyn ChainRpc>,
    ) -> Result<Arc<dyn CipherEngine>, ExternalError> {
        info!(
            chain_id,
            acl = ?metadata.acl_address,
            "Creating mock cipher engine"
        );
        Ok(Arc::new(MockEngine::new(chain_id, metadata)))
    }
}

fn normalize(handle: &str) -> String {
    handle.to_ascii_lowercase()
}

fn now_seconds() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
