// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::CipherEngine;
use crate::config::ChainConfig;
use crate::error::ExternalError;
use crate::rpc::{ChainRpc, RelayerMetadata};
use crate::storage::codec;
use async_trait::async_trait;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Network public key and public parameters needed to build a production engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyMaterial {
    pub public_key_id: String,
    #[serde(with = "codec::bytes")]
    pub public_key: Vec<u8>,
    pub public_params_id: String,
    #[serde(with = "codec::bytes")]
    pub public_params: Vec<u8>,
}

pub struct ProductionEngineParams {
    pub chain: ChainConfig,
    pub acl_address: Address,
    pub public_key: PublicKeyMaterial,
    pub rpc: Arc<dyn ChainRpc>,
}

/// Binding to the production relayer SDK.
///
/// `initialize` loads and initializes the SDK; the resolver calls it at most once
/// successfully.
#[async_trait]
pub trait ProductionEngineFactory: Send + Sync {
    async fn initialize(&self) -> Result<(), ExternalError>;

    async fn fetch_public_key(
        &self,
        chain: &ChainConfig,
        acl_address: Address,
    ) -> Result<PublicKeyMaterial, ExternalError>;

    async fn create_engine(
        &self,
        params: ProductionEngineParams,
    ) -> Result<Arc<dyn CipherEngine>, ExternalError>;
}

/// Builds lightweight engines for nodes running the FHEVM mock plugin
#[async_trait]
pub trait MockEngineFactory: Send + Sync {
    async fn create_mock_engine(
        &self,
        chain_id: u64,
        metadata: RelayerMetadata,
        rpc: Arc<dyn ChainRpc>,
    ) -> Result<Arc<dyn CipherEngine>, ExternalError>;
}
