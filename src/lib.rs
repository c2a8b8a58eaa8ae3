// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod auth;
pub mod config;
mod digest;
pub mod engine;
pub mod error;
pub mod resolver;
pub mod rpc;
pub mod session;
pub mod signer;
pub mod storage;

// Re-export the types applications use directly
pub use auth::{AuthorizationOptions, DecryptionAuthorizationManager, DecryptionSignature};
pub use config::{
    ChainConfig, ChainRegistry, ConfigStore, ExecutionEnvironment, SessionConfig, SessionState,
    SessionStatus, StatePatch, SubscribeOptions, Subscription,
};
pub use engine::{
    CipherEngine, ClearValue, DecryptedValues, EncryptedInputBuilder, EncryptedInputs,
    EngineHandle, EngineKind, FheValue, HandleContractPair, KeyPair, MockEngineFactory,
    ProductionEngineFactory, ProductionEngineParams, PublicKeyMaterial, UserDecryptRequest,
};
pub use error::{ExternalError, Result, SessionError};
pub use resolver::{InstanceResolver, ResolveStage};
pub use rpc::{ChainRpc, Connection, RelayerMetadata};
pub use session::{validate_handle, Session};
pub use signer::SessionSigner;
pub use storage::{
    FileStorage, MemoryStorage, NoopStorage, SessionStorage, StorageAdapter, StorageError,
};

pub use tokio_util::sync::CancellationToken;
