// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use tiny_keccak::{Hasher, Keccak};

/// Hash data with keccak256
pub(crate) fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut hash = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut hash);
    hash
}
