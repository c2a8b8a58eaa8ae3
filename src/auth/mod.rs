// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Decryption Authorization
//!
//! A user decryption needs an EIP-712 signature binding an ephemeral key pair to the
//! contracts whose values may be decrypted. Signatures are persisted per
//! (signer, contract set) so the user is only prompted again when the set changes or
//! the signature expires.

pub mod artifact;
pub mod manager;

pub use artifact::{cache_key, normalize_contracts, DecryptionSignature, SECONDS_PER_DAY};
pub use manager::{AuthorizationOptions, DecryptionAuthorizationManager};
