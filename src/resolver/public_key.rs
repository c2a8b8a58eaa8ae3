// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::cancel::cancellable;
use crate::config::ChainConfig;
use crate::engine::{ProductionEngineFactory, PublicKeyMaterial};
use crate::error::SessionError;
use crate::storage::SessionStorage;
use ethers::types::Address;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub fn cache_key(acl_address: Address) -> String {
    format!("public-key:{:#x}", acl_address)
}

/// Network public key for `acl_address`, from storage when cached, else fetched and
/// stored. Storage failures only cost a refetch.
pub async fn load_or_fetch(
    storage: &SessionStorage,
    factory: &dyn ProductionEngineFactory,
    chain: &ChainConfig,
    acl_address: Address,
    cancel: &CancellationToken,
) -> Result<PublicKeyMaterial, SessionError> {
    let key = cache_key(acl_address);

    match cancellable(cancel, storage.get::<PublicKeyMaterial>(&key)).await {
        Ok(Some(material)) => {
            debug!(
                chain_id = chain.chain_id,
                public_key_id = %material.public_key_id,
                "Using cached public key"
            );
            return Ok(material);
        }
        Ok(None) => {}
        Err(SessionError::Aborted) => return Err(SessionError::Aborted),
        Err(e) => warn!(key = %key, error = %e, "Public key cache unreadable, refetching"),
    }

    let material = cancellable(cancel, factory.fetch_public_key(chain, acl_address)).await?;
    info!(
        chain_id = chain.chain_id,
        public_key_id = %material.public_key_id,
        "Fetched network public key"
    );

    if let Err(e) = storage.set(&key, &material).await {
        warn!(key = %key, error = %e, "Failed to cache public key");
    }
    Ok(material)
}
