// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod chains;
pub mod state;
pub mod store;

pub use chains::{ChainConfig, ChainRegistry, FhevmContracts, HARDHAT_CHAIN_ID, SEPOLIA_CHAIN_ID};
pub use state::{PersistedEnvelope, PersistedSession, SessionState, SessionStatus, StatePatch};
pub use store::{ConfigStore, SubscribeOptions, Subscription};

use crate::storage::DEFAULT_STORAGE_PREFIX;

/// Default lifetime of a decryption signature
pub const DEFAULT_SIGNATURE_VALIDITY_DAYS: u32 = 365;

/// Where the session is running. Production engines need client-only capabilities
/// and are refused while rendering on a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionEnvironment {
    Client,
    Server,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub chains: ChainRegistry,
    pub storage_prefix: String,
    /// Skip loading persisted state until `rehydrate` is called
    pub ssr: bool,
    pub environment: ExecutionEnvironment,
    pub signature_validity_days: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chains: ChainRegistry::default(),
            storage_prefix: DEFAULT_STORAGE_PREFIX.to_string(),
            ssr: false,
            environment: ExecutionEnvironment::Client,
            signature_validity_days: DEFAULT_SIGNATURE_VALIDITY_DAYS,
        }
    }
}

impl SessionConfig {
    /// Defaults overridden by `FHEVM_*` environment variables
    pub fn from_env() -> Self {
        let ssr = std::env::var("FHEVM_SSR")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            chains: ChainRegistry::default(),
            storage_prefix: std::env::var("FHEVM_STORAGE_PREFIX")
                .unwrap_or_else(|_| DEFAULT_STORAGE_PREFIX.to_string()),
            ssr,
            environment: if ssr {
                ExecutionEnvironment::Server
            } else {
                ExecutionEnvironment::Client
            },
            signature_validity_days: std::env::var("FHEVM_SIGNATURE_VALIDITY_DAYS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|days| *days > 0)
                .unwrap_or(DEFAULT_SIGNATURE_VALIDITY_DAYS),
        }
    }

    pub fn with_chains(mut self, chains: ChainRegistry) -> Self {
        self.chains = chains;
        self
    }

    pub fn with_environment(mut self, environment: ExecutionEnvironment) -> Self {
        self.environment = environment;
        self
    }
}
