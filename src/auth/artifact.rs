// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::digest::keccak256;
use crate::engine::KeyPair;
use crate::storage::codec;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Storage key prefix of persisted decryption signatures
pub const SIGNATURE_KEY_PREFIX: &str = "decryption-signature";

/// Time-boxed authorization to decrypt values of a fixed contract set.
///
/// Valid while `now < issued_at + validity_days * 86400`. Covers a request when every
/// requested contract is in `authorized_contracts`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionSignature {
    #[serde(with = "codec::bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "codec::bytes")]
    pub private_key: Vec<u8>,
    #[serde(with = "codec::bytes")]
    pub signature: Vec<u8>,
    /// Sorted, without duplicates
    pub authorized_contracts: Vec<Address>,
    pub signer_address: Address,
    /// Unix seconds
    pub issued_at: u64,
    pub validity_days: u32,
}

impl DecryptionSignature {
    pub fn new(
        key_pair: KeyPair,
        signature: Vec<u8>,
        contracts: &[Address],
        signer_address: Address,
        issued_at: u64,
        validity_days: u32,
    ) -> Self {
        Self {
            public_key: key_pair.public_key,
            private_key: key_pair.private_key,
            signature,
            authorized_contracts: normalize_contracts(contracts),
            signer_address,
            issued_at,
            validity_days,
        }
    }

    pub fn expires_at(&self) -> u64 {
        self.issued_at
            .saturating_add(u64::from(self.validity_days) * SECONDS_PER_DAY)
    }

    pub fn is_valid_at(&self, now: u64) -> bool {
        now < self.expires_at()
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_seconds())
    }

    /// Time left before expiry, `None` once expired
    pub fn time_remaining(&self) -> Option<Duration> {
        self.time_remaining_at(now_seconds())
    }

    pub fn time_remaining_at(&self, now: u64) -> Option<Duration> {
        self.expires_at()
            .checked_sub(now)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn covers(&self, contracts: &[Address]) -> bool {
        contracts
            .iter()
            .all(|contract| self.authorized_contracts.binary_search(contract).is_ok())
    }

    /// Requested contracts this signature does not cover
    pub fn missing(&self, contracts: &[Address]) -> Vec<Address> {
        normalize_contracts(contracts)
            .into_iter()
            .filter(|contract| self.authorized_contracts.binary_search(contract).is_err())
            .collect()
    }

    /// Signature as hex, without `0x`
    pub fn signature_hex(&self) -> String {
        hex::encode(&self.signature)
    }

    pub fn key_pair(&self) -> KeyPair {
        KeyPair {
            public_key: self.public_key.clone(),
            private_key: self.private_key.clone(),
        }
    }
}

impl fmt::Debug for DecryptionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionSignature")
            .field("signer_address", &self.signer_address)
            .field("authorized_contracts", &self.authorized_contracts)
            .field("issued_at", &self.issued_at)
            .field("validity_days", &self.validity_days)
            .field("signature", &format!("0x{}", self.signature_hex()))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Sort and deduplicate. `Address` orders by bytes, the same as lowercase hex.
pub fn normalize_contracts(contracts: &[Address]) -> Vec<Address> {
    let mut contracts = contracts.to_vec();
    contracts.sort_unstable();
    contracts.dedup();
    contracts
}

/// Deterministic storage key for a (signer, contract set) pair
pub fn cache_key(signer: Address, contracts: &[Address]) -> String {
    let contracts: Vec<String> = normalize_contracts(contracts)
        .iter()
        .map(|contract| format!("{:#x}", contract))
        .collect();
    let material = format!("{:#x}:{}", signer, contracts.join(","));
    format!(
        "{}:0x{}",
        SIGNATURE_KEY_PREFIX,
        hex::encode(keccak256(material.as_bytes()))
    )
}

pub(crate) fn now_seconds() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
