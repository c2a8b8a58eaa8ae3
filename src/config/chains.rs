// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

pub const SEPOLIA_CHAIN_ID: u64 = 11155111;
pub const HARDHAT_CHAIN_ID: u64 = 31337;
pub const DEFAULT_MOCK_RPC_URL: &str = "http://localhost:8545";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub contracts: FhevmContracts,
    /// Relayer endpoint used by the production cipher engine
    pub relayer_url: Option<String>,
}

/// FHEVM host contracts the cipher engine is wired to
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FhevmContracts {
    pub acl: String,
    pub kms_verifier: String,
    pub input_verifier: String,
}

impl ChainConfig {
    pub fn sepolia() -> Self {
        ChainConfig {
            chain_id: SEPOLIA_CHAIN_ID,
            name: "Sepolia".to_string(),
            rpc_url: std::env::var("SEPOLIA_RPC_URL")
                .unwrap_or_else(|_| "https://ethereum-sepolia-rpc.publicnode.com".to_string()),
            contracts: FhevmContracts {
                acl: "0x687820221192C5B662b25367F70076A37bc79b6c".to_string(),
                kms_verifier: "0x1364cBBf2cDF5032C47d8226a6f6FBD2AFCDacAC".to_string(),
                input_verifier: "0xbc91f3daD1A5F19F8390c400196e58073B6a0BC4".to_string(),
            },
            relayer_url: Some(
                std::env::var("FHEVM_RELAYER_URL")
                    .unwrap_or_else(|_| "https://relayer.testnet.zama.cloud".to_string()),
            ),
        }
    }

    /// Local hardhat node; contract addresses come from the node's relayer metadata
    pub fn hardhat_local() -> Self {
        ChainConfig {
            chain_id: HARDHAT_CHAIN_ID,
            name: "Hardhat".to_string(),
            rpc_url: std::env::var("FHEVM_MOCK_RPC_URL")
                .unwrap_or_else(|_| DEFAULT_MOCK_RPC_URL.to_string()),
            contracts: FhevmContracts {
                acl: "0x0000000000000000000000000000000000000000".to_string(),
                kms_verifier: "0x0000000000000000000000000000000000000000".to_string(),
                input_verifier: "0x0000000000000000000000000000000000000000".to_string(),
            },
            relayer_url: None,
        }
    }

    /// ACL contract address, rejected when malformed or zero
    pub fn acl_address(&self) -> Option<Address> {
        Address::from_str(&self.contracts.acl)
            .ok()
            .filter(|address| !address.is_zero())
    }
}

/// Statically configured chains plus the mock-chain registry.
///
/// Chains keep their configuration order: the first one is the fallback whenever a
/// persisted chain id is no longer configured.
#[derive(Clone, Debug)]
pub struct ChainRegistry {
    chains: Vec<ChainConfig>,
    mock_chains: HashMap<u64, String>,
}

impl ChainRegistry {
    pub fn new(chains: Vec<ChainConfig>) -> Self {
        ChainRegistry {
            chains,
            mock_chains: HashMap::new(),
        }
    }

    /// Register `chain_id` as a mock chain served at `rpc_url`
    pub fn with_mock_chain(mut self, chain_id: u64, rpc_url: impl Into<String>) -> Self {
        self.mock_chains.insert(chain_id, rpc_url.into());
        self
    }

    pub fn get_chain(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.iter().find(|chain| chain.chain_id == chain_id)
    }

    pub fn get_all_chains(&self) -> &[ChainConfig] {
        &self.chains
    }

    pub fn default_chain_id(&self) -> Option<u64> {
        self.chains.first().map(|chain| chain.chain_id)
    }

    pub fn mock_rpc_url(&self, chain_id: u64) -> Option<&str> {
        self.mock_chains.get(&chain_id).map(String::as_str)
    }

    pub fn is_mock_chain(&self, chain_id: u64) -> bool {
        self.mock_chains.contains_key(&chain_id)
    }

    /// Configured either as a regular chain or in the mock registry
    pub fn is_chain_supported(&self, chain_id: u64) -> bool {
        self.get_chain(chain_id).is_some() || self.is_mock_chain(chain_id)
    }

    pub fn list_supported_chains(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.chains.iter().map(|chain| chain.chain_id).collect();
        for chain_id in self.mock_chains.keys() {
            if !ids.contains(chain_id) {
                ids.push(*chain_id);
            }
        }
        ids
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        let mock_rpc = std::env::var("FHEVM_MOCK_RPC_URL")
            .unwrap_or_else(|_| DEFAULT_MOCK_RPC_URL.to_string());
        ChainRegistry::new(vec![ChainConfig::sepolia(), ChainConfig::hardhat_local()])
            .with_mock_chain(HARDHAT_CHAIN_ID, mock_rpc)
    }
}
