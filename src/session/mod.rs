// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Session Actions
//!
//! [`Session`] wires the config store, the instance resolver and the authorization
//! manager together and exposes the four actions applications call:
//! [`create_instance`](Session::create_instance), [`encrypt`](Session::encrypt),
//! [`decrypt`](Session::decrypt) and [`public_decrypt`](Session::public_decrypt).
//!
//! Failures are recorded into the session state (status `error`) and returned to the
//! caller as the same value. Cancellation is never recorded.

mod create_instance;
mod decrypt;
mod encrypt;
pub mod handle;
mod public_decrypt;

pub use decrypt::user_decrypt;
pub use handle::{validate_handle, HANDLE_HEX_LEN};

use crate::auth::{AuthorizationOptions, DecryptionAuthorizationManager};
use crate::config::{
    ConfigStore, SessionConfig, SessionState, SubscribeOptions, Subscription,
};
use crate::engine::{EngineHandle, MockEngineFactory, ProductionEngineFactory};
use crate::error::SessionError;
use crate::resolver::InstanceResolver;
use crate::storage::{SessionStorage, StorageAdapter};
use ethers::types::Address;
use std::sync::Arc;
use tracing::{error, info};

pub struct Session {
    config: SessionConfig,
    store: ConfigStore,
    resolver: InstanceResolver,
    authorization: DecryptionAuthorizationManager,
}

impl Session {
    /// Build a session over `storage`. Unless `config.ssr` is set, the persisted
    /// projection is loaded before this returns.
    pub async fn new(
        config: SessionConfig,
        storage: Arc<dyn StorageAdapter>,
        production: Arc<dyn ProductionEngineFactory>,
        mock: Option<Arc<dyn MockEngineFactory>>,
    ) -> Result<Self, SessionError> {
        if config.signature_validity_days == 0 {
            return Err(SessionError::InvalidConfig(
                "signature_validity_days must be at least 1".to_string(),
            ));
        }

        let storage = SessionStorage::new(storage, config.storage_prefix.clone());
        let store = ConfigStore::create(config.chains.clone(), storage.clone(), config.ssr).await?;
        let resolver = InstanceResolver::new(store.clone(), config.environment, production, mock);
        let authorization = DecryptionAuthorizationManager::new(
            storage,
            AuthorizationOptions {
                validity_days: config.signature_validity_days,
            },
        );

        info!(
            prefix = %config.storage_prefix,
            ssr = config.ssr,
            chains = ?config.chains.list_supported_chains(),
            "Session created"
        );
        Ok(Self {
            config,
            store,
            resolver,
            authorization,
        })
    }

    /// Load persisted state after server rendering. No-op when already hydrated.
    pub async fn hydrate(&self) -> bool {
        self.store.rehydrate().await
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.store.state()
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn resolver(&self) -> &InstanceResolver {
        &self.resolver
    }

    pub fn authorization(&self) -> &DecryptionAuthorizationManager {
        &self.authorization
    }

    pub fn subscribe<T, S, L>(
        &self,
        selector: S,
        listener: L,
        options: SubscribeOptions<T>,
    ) -> Subscription
    where
        T: PartialEq + Send + 'static,
        S: Fn(&SessionState) -> T + Send + 'static,
        L: FnMut(&T, &T) + Send + 'static,
    {
        self.store.subscribe(selector, listener, options)
    }

    /// Drop the stored decryption signature for `signer` and `contracts`
    pub async fn clear_decryption_signature(
        &self,
        signer: Address,
        contracts: &[Address],
    ) -> Result<(), SessionError> {
        self.authorization.clear(signer, contracts).await
    }

    fn ready_engine(&self) -> Result<EngineHandle, SessionError> {
        let state = self.store.state();
        state
            .ready_engine()
            .cloned()
            .ok_or(SessionError::EngineNotReady {
                chain_id: state.active_chain_id,
            })
    }

    /// Record a failed action into the session state and hand the error back unchanged
    async fn record<T>(
        &self,
        action: &'static str,
        result: Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        if let Err(err) = &result {
            if !err.is_aborted() {
                error!(action, code = err.code(), error = %err, "Session action failed");
                let recorded = err.clone();
                self.store.update(move |state| state.failed(recorded)).await;
            }
        }
        result
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("store", &self.store)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}
