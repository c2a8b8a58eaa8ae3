// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Session Error Types
//!
//! Every public operation of the session layer fails with [`SessionError`].
//!
//! ## Error Categories
//!
//! - **Configuration**: `ChainNotConfigured`, `InvalidAclAddress` (deployment mistakes, never retried)
//! - **Environment**: `SsrNotSupported` (retry from a client context)
//! - **Authorization**: `SignatureError`, `SignatureExpired`, `SignatureMismatch` (re-sign to recover)
//! - **Validation**: `InvalidHandle` (caller must fix the input)
//! - **Cancellation**: `Aborted` (not a failure, never recorded into session state)
//! - **Pass-through**: `External` (cipher engine, signer and RPC failures, carried unchanged)
//!
//! ## Identity Preservation
//!
//! Errors raised by external collaborators are stored in an [`ExternalError`], a shared
//! pointer to the original error value. Cloning a `SessionError` never copies or re-types
//! that value, so the error returned to the caller and the one recorded into session
//! state are the same object (`ExternalError::ptr_eq`), and `downcast_ref` recovers the
//! concrete type the collaborator produced.

use crate::storage::StorageError;
use ethers::types::Address;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Shared handle to an error produced outside this crate
#[derive(Clone)]
pub struct ExternalError(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl ExternalError {
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Arc::new(err))
    }

    pub fn from_boxed(err: Box<dyn std::error::Error + Send + Sync + 'static>) -> Self {
        Self(Arc::from(err))
    }

    /// Plain message error, for collaborators that only report text
    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::from_boxed(message.into())
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// True when both handles point at the same original error value
    pub fn ptr_eq(&self, other: &ExternalError) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl fmt::Debug for ExternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for ExternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for ExternalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<anyhow::Error> for ExternalError {
    fn from(err: anyhow::Error) -> Self {
        Self::from_boxed(err.into())
    }
}

impl From<ethers::providers::ProviderError> for ExternalError {
    fn from(err: ethers::providers::ProviderError) -> Self {
        Self::new(err)
    }
}

/// Errors surfaced by the session layer
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("Chain {chain_id} is not configured")]
    ChainNotConfigured { chain_id: u64 },

    #[error("A production cipher engine cannot be created during server-side rendering")]
    SsrNotSupported,

    #[error("Invalid ACL contract address for chain {chain_id}: '{address}'")]
    InvalidAclAddress { chain_id: u64, address: String },

    #[error("Failed to obtain a decryption signature for {signer:?}")]
    SignatureError { signer: Option<Address> },

    #[error("Decryption signature expired at {expired_at} (unix seconds)")]
    SignatureExpired { expired_at: u64 },

    #[error("Decryption signature does not cover contracts {missing:?}")]
    SignatureMismatch { missing: Vec<Address> },

    #[error("Invalid handle '{handle}': {reason}")]
    InvalidHandle { handle: String, reason: String },

    #[error("No cipher engine is ready for chain {chain_id}")]
    EngineNotReady { chain_id: u64 },

    #[error("Invalid connection: {0}")]
    InvalidConnection(String),

    #[error("Invalid session configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Operation aborted")]
    Aborted,

    #[error(transparent)]
    External(#[from] ExternalError),
}

impl SessionError {
    /// Stable machine readable code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::ChainNotConfigured { .. } => "CHAIN_NOT_CONFIGURED",
            SessionError::SsrNotSupported => "SSR_NOT_SUPPORTED",
            SessionError::InvalidAclAddress { .. } => "INVALID_ACL_ADDRESS",
            SessionError::SignatureError { .. } => "SIGNATURE_ERROR",
            SessionError::SignatureExpired { .. } => "SIGNATURE_EXPIRED",
            SessionError::SignatureMismatch { .. } => "SIGNATURE_MISMATCH",
            SessionError::InvalidHandle { .. } => "INVALID_HANDLE",
            SessionError::EngineNotReady { .. } => "ENGINE_NOT_READY",
            SessionError::InvalidConnection(_) => "INVALID_CONNECTION",
            SessionError::InvalidConfig(_) => "INVALID_CONFIG",
            SessionError::Storage(_) => "STORAGE_ERROR",
            SessionError::Aborted => "ABORTED",
            SessionError::External(_) => "EXTERNAL",
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, SessionError::Aborted)
    }

    /// The original collaborator error, if this is a pass-through failure
    pub fn as_external(&self) -> Option<&ExternalError> {
        match self {
            SessionError::External(err) => Some(err),
            _ => None,
        }
    }

    /// Identity comparison: pass-through errors compare by pointer, others by code
    /// and message.
    pub fn same_as(&self, other: &SessionError) -> bool {
        match (self, other) {
            (SessionError::External(a), SessionError::External(b)) => a.ptr_eq(b),
            _ => self.code() == other.code() && self.to_string() == other.to_string(),
        }
    }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
