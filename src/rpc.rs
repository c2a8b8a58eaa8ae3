// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Chain RPC Capability
//!
//! The resolver needs three things from a node: its chain id, its client version and,
//! for hardhat nodes running the FHEVM mock plugin, the relayer metadata advertising
//! the host contract addresses. [`ChainRpc`] exposes exactly those; it is implemented
//! for ethers' `Provider<Http>` and can be faked in tests.

use crate::error::{ExternalError, SessionError};
use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use url::Url;

pub const RELAYER_METADATA_METHOD: &str = "fhevm_relayer_metadata";

/// Host contract addresses advertised by a mock-capable node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayerMetadata {
    #[serde(rename = "ACLAddress")]
    pub acl_address: Address,
    #[serde(rename = "InputVerifierAddress")]
    pub input_verifier_address: Address,
    #[serde(rename = "KMSVerifierAddress")]
    pub kms_verifier_address: Address,
}

#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ExternalError>;

    async fn client_version(&self) -> Result<String, ExternalError>;

    async fn relayer_metadata(&self) -> Result<RelayerMetadata, ExternalError>;
}

#[async_trait]
impl ChainRpc for Provider<Http> {
    async fn chain_id(&self) -> Result<u64, ExternalError> {
        let chain_id = self.get_chainid().await?;
        Ok(chain_id.as_u64())
    }

    async fn client_version(&self) -> Result<String, ExternalError> {
        Ok(Middleware::client_version(self).await?)
    }

    async fn relayer_metadata(&self) -> Result<RelayerMetadata, ExternalError> {
        let metadata: RelayerMetadata = self
            .request(RELAYER_METADATA_METHOD, Vec::<serde_json::Value>::new())
            .await?;
        Ok(metadata)
    }
}

/// How to reach the chain a cipher engine should be resolved for
#[derive(Clone)]
pub enum Connection {
    /// A live provider
    Provider(Arc<dyn ChainRpc>),
    /// A bare http(s) RPC endpoint
    RpcUrl(String),
}

impl Connection {
    pub fn into_rpc(self) -> Result<Arc<dyn ChainRpc>, SessionError> {
        match self {
            Connection::Provider(rpc) => Ok(rpc),
            Connection::RpcUrl(rpc_url) => {
                let url = Url::parse(&rpc_url).map_err(|e| {
                    SessionError::InvalidConnection(format!("'{}': {}", rpc_url, e))
                })?;
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(SessionError::InvalidConnection(format!(
                        "'{}': unsupported scheme '{}'",
                        rpc_url,
                        url.scheme()
                    )));
                }
                let provider = Provider::<Http>::try_from(url.as_str()).map_err(|e| {
                    SessionError::InvalidConnection(format!("'{}': {}", rpc_url, e))
                })?;
                Ok(Arc::new(provider))
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connection::Provider(_) => f.write_str("Connection::Provider"),
            Connection::RpcUrl(url) => write!(f, "Connection::RpcUrl({})", url),
        }
    }
}

impl From<&str> for Connection {
    fn from(rpc_url: &str) -> Self {
        Connection::RpcUrl(rpc_url.to_string())
    }
}

impl From<String> for Connection {
    fn from(rpc_url: String) -> Self {
        Connection::RpcUrl(rpc_url)
    }
}
