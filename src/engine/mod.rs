// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Cipher Engine Boundary
//!
//! The session layer never encrypts or decrypts anything itself. All FHE work goes
//! through a [`CipherEngine`], supplied by a production relayer SDK binding or by the
//! local [`mock`] engine (cargo feature `mock`).
//!
//! Engines are expensive to build (remote key fetch, crypto context setup), so the
//! resolver builds one per chain and hands out [`EngineHandle`]s that share it.

pub mod factory;
#[cfg(feature = "mock")]
pub mod mock;

use crate::error::ExternalError;
use crate::storage::codec;
use async_trait::async_trait;
use ethers::types::transaction::eip712::TypedData;
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use factory::{
    MockEngineFactory, ProductionEngineFactory, ProductionEngineParams, PublicKeyMaterial,
};

/// Handle byte length: 32 bytes, `0x` + 64 hex characters as a string
pub const HANDLE_BYTES: usize = 32;

/// Encrypted value reference paired with the contract allowed to use it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleContractPair {
    pub handle: String,
    pub contract_address: Address,
}

impl HandleContractPair {
    pub fn new(handle: impl Into<String>, contract_address: Address) -> Self {
        Self {
            handle: handle.into(),
            contract_address,
        }
    }
}

/// Plaintext produced by a decryption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ClearValue {
    Bool(bool),
    Uint(#[serde(with = "codec::bigint")] U256),
    Address(Address),
}

impl From<bool> for ClearValue {
    fn from(value: bool) -> Self {
        ClearValue::Bool(value)
    }
}

impl From<U256> for ClearValue {
    fn from(value: U256) -> Self {
        ClearValue::Uint(value)
    }
}

impl From<Address> for ClearValue {
    fn from(value: Address) -> Self {
        ClearValue::Address(value)
    }
}

/// Decrypted values keyed by handle
pub type DecryptedValues = HashMap<String, ClearValue>;

/// Typed plaintext to encrypt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FheValue {
    Bool(bool),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Uint128(u128),
    Uint256(U256),
    Address(Address),
}

impl FheValue {
    /// FHEVM type discriminant, stored in byte 30 of a handle
    pub fn type_id(&self) -> u8 {
        match self {
            FheValue::Bool(_) => 0,
            FheValue::Uint8(_) => 2,
            FheValue::Uint16(_) => 3,
            FheValue::Uint32(_) => 4,
            FheValue::Uint64(_) => 5,
            FheValue::Uint128(_) => 6,
            FheValue::Address(_) => 7,
            FheValue::Uint256(_) => 8,
        }
    }

    pub fn bits(&self) -> u16 {
        match self {
            FheValue::Bool(_) => 2,
            FheValue::Uint8(_) => 8,
            FheValue::Uint16(_) => 16,
            FheValue::Uint32(_) => 32,
            FheValue::Uint64(_) => 64,
            FheValue::Uint128(_) => 128,
            FheValue::Address(_) => 160,
            FheValue::Uint256(_) => 256,
        }
    }

    pub fn to_clear(&self) -> ClearValue {
        match *self {
            FheValue::Bool(v) => ClearValue::Bool(v),
            FheValue::Uint8(v) => ClearValue::Uint(U256::from(v)),
            FheValue::Uint16(v) => ClearValue::Uint(U256::from(v)),
            FheValue::Uint32(v) => ClearValue::Uint(U256::from(v)),
            FheValue::Uint64(v) => ClearValue::Uint(U256::from(v)),
            FheValue::Uint128(v) => ClearValue::Uint(U256::from(v)),
            FheValue::Uint256(v) => ClearValue::Uint(v),
            FheValue::Address(v) => ClearValue::Address(v),
        }
    }
}

/// Output of an encrypted input: one handle per added value plus the input proof
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedInputs {
    pub handles: Vec<[u8; HANDLE_BYTES]>,
    pub input_proof: Vec<u8>,
}

impl EncryptedInputs {
    pub fn handle_hex(&self, index: usize) -> Option<String> {
        self.handles
            .get(index)
            .map(|handle| format!("0x{}", hex::encode(handle)))
    }
}

/// Ephemeral key pair bound into a decryption signature
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    #[serde(with = "codec::bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "codec::bytes")]
    pub private_key: Vec<u8>,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &format!("0x{}", hex::encode(&self.public_key)))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Everything a user decryption needs, in one batch
#[derive(Debug, Clone, Copy)]
pub struct UserDecryptRequest<'a> {
    pub handles: &'a [HandleContractPair],
    pub private_key: &'a [u8],
    pub public_key: &'a [u8],
    /// Hex signature without the `0x` prefix
    pub signature: &'a str,
    pub contract_addresses: &'a [Address],
    pub user_address: Address,
    pub start_timestamp: u64,
    pub duration_days: u32,
}

/// Accumulates plaintexts for one (contract, user) pair, then encrypts them together
#[async_trait]
pub trait EncryptedInputBuilder: Send {
    fn add(&mut self, value: FheValue) -> Result<(), ExternalError>;
    async fn encrypt(self: Box<Self>) -> Result<EncryptedInputs, ExternalError>;
}

#[async_trait]
pub trait CipherEngine: Send + Sync {
    fn build_encrypted_input(
        &self,
        contract_address: Address,
        user_address: Address,
    ) -> Box<dyn EncryptedInputBuilder>;

    fn generate_keypair(&self) -> Result<KeyPair, ExternalError>;

    /// EIP-712 payload the user signs to authorize decryption for `contract_addresses`
    fn build_eip712(
        &self,
        public_key: &[u8],
        contract_addresses: &[Address],
        start_timestamp: u64,
        duration_days: u32,
    ) -> Result<TypedData, ExternalError>;

    async fn decrypt_as_user(
        &self,
        request: UserDecryptRequest<'_>,
    ) -> Result<DecryptedValues, ExternalError>;

    async fn decrypt_public(&self, handles: &[String]) -> Result<DecryptedValues, ExternalError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineKind {
    Mock,
    Production,
}

/// Shared cipher engine bound to the chain it was built for.
///
/// Equality is identity: two handles are equal only when they share the same engine
/// instance.
#[derive(Clone)]
pub struct EngineHandle {
    chain_id: u64,
    kind: EngineKind,
    engine: Arc<dyn CipherEngine>,
}

impl EngineHandle {
    pub fn new(chain_id: u64, kind: EngineKind, engine: Arc<dyn CipherEngine>) -> Self {
        Self {
            chain_id,
            kind,
            engine,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn engine(&self) -> &Arc<dyn CipherEngine> {
        &self.engine
    }

    pub fn ptr_eq(&self, other: &EngineHandle) -> bool {
        Arc::ptr_eq(&self.engine, &other.engine)
    }
}

impl PartialEq for EngineHandle {
    fn eq(&self, other: &Self) -> bool {
        self.chain_id == other.chain_id && self.ptr_eq(other)
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("chain_id", &self.chain_id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
