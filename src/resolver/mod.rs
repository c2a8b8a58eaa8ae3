// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Instance Resolver
//!
//! Turns a chain connection into a ready cipher engine and publishes it into the
//! [`ConfigStore`].
//!
//! ## Resolution
//!
//! 1. Ask the node for its chain id and check it is configured (regular or mock chain).
//!    An unconfigured chain fails without touching session state.
//! 2. Mark the session `loading` for that chain.
//! 3. Reuse the chain's cached engine if one was built before.
//! 4. Otherwise probe mock chains for the FHEVM mock plugin and build a mock engine, or
//!    take the production path: refuse during server rendering, initialize the SDK once,
//!    validate the ACL address, load the network public key and build the engine.
//! 5. Publish `ready` with the engine, or `error` with the cause.
//!
//! ## Cancellation and stale requests
//!
//! Every I/O step runs through [`cancel::cancellable`], including the wait on another
//! call's construction of the same chain. A cancelled resolution returns
//! [`SessionError::Aborted`]. Each call also takes a sequence number; only the most
//! recent call may publish, so an older call finishing late returns `Aborted` and leaves
//! the state alone. When the most recent call ends without publishing (aborted, or the
//! chain turned out unusable) any `loading` left in the state is replaced by the last
//! settled state, since no call in flight can publish any more. Engines built by
//! superseded calls stay cached.

pub mod cancel;
pub mod public_key;

use crate::config::{
    ChainRegistry, ConfigStore, ExecutionEnvironment, SessionState, SessionStatus,
};
use crate::engine::{
    EngineHandle, EngineKind, MockEngineFactory, ProductionEngineFactory, ProductionEngineParams,
};
use crate::error::SessionError;
use crate::rpc::{ChainRpc, Connection, RelayerMetadata};
use crate::storage::SessionStorage;
use cancel::cancellable;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Client version marker of nodes able to host the FHEVM mock plugin
const MOCK_CLIENT_MARKER: &str = "hardhat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStage {
    ResolvingChain,
    ProbingMock,
    Constructing,
    Cached,
    Ready,
    Error,
    Aborted,
}

impl fmt::Display for ResolveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            ResolveStage::ResolvingChain => "resolving-chain",
            ResolveStage::ProbingMock => "probing-mock",
            ResolveStage::Constructing => "constructing",
            ResolveStage::Cached => "cached",
            ResolveStage::Ready => "ready",
            ResolveStage::Error => "error",
            ResolveStage::Aborted => "aborted",
        };
        f.write_str(stage)
    }
}

pub struct InstanceResolver {
    store: ConfigStore,
    storage: SessionStorage,
    environment: ExecutionEnvironment,
    production: Arc<dyn ProductionEngineFactory>,
    mock: Option<Arc<dyn MockEngineFactory>>,
    engines: Mutex<HashMap<u64, Arc<OnceCell<EngineHandle>>>>,
    sdk_initialized: OnceCell<()>,
    sequence: AtomicU64,
    settled: Mutex<Option<SessionState>>,
}

impl InstanceResolver {
    pub fn new(
        store: ConfigStore,
        environment: ExecutionEnvironment,
        production: Arc<dyn ProductionEngineFactory>,
        mock: Option<Arc<dyn MockEngineFactory>>,
    ) -> Self {
        let storage = store.storage().clone();
        Self {
            store,
            storage,
            environment,
            production,
            mock,
            engines: Mutex::new(HashMap::new()),
            sdk_initialized: OnceCell::new(),
            sequence: AtomicU64::new(0),
            settled: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    fn registry(&self) -> &ChainRegistry {
        self.store.registry()
    }

    pub fn is_sdk_initialized(&self) -> bool {
        self.sdk_initialized.initialized()
    }

    /// Engine previously built for `chain_id`, if any
    pub fn cached_engine(&self, chain_id: u64) -> Option<EngineHandle> {
        self.engines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&chain_id)
            .and_then(|cell| cell.get().cloned())
    }

    pub fn cached_chains(&self) -> Vec<u64> {
        let engines = self.engines.lock().unwrap_or_else(PoisonError::into_inner);
        let mut chains: Vec<u64> = engines
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(chain_id, _)| *chain_id)
            .collect();
        chains.sort_unstable();
        chains
    }

    /// Resolve the cipher engine for the chain behind `connection`
    pub async fn resolve(
        &self,
        connection: Connection,
        cancel: &CancellationToken,
    ) -> Result<EngineHandle, SessionError> {
        let request = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let restore = self.restore_point();

        let result = self.resolve_request(request, connection, cancel).await;
        if let Err(e) = &result {
            if e.is_aborted() {
                debug!(request, stage = %ResolveStage::Aborted, "Resolution aborted");
            }
            self.settle_abandoned(request, restore).await;
        }
        result
    }

    async fn resolve_request(
        &self,
        request: u64,
        connection: Connection,
        cancel: &CancellationToken,
    ) -> Result<EngineHandle, SessionError> {
        debug!(request, stage = %ResolveStage::ResolvingChain, ?connection, "Resolving cipher engine");
        let rpc = connection.into_rpc()?;

        let chain_id = match cancellable(cancel, rpc.chain_id()).await {
            Ok(chain_id) => chain_id,
            Err(SessionError::Aborted) => return Err(SessionError::Aborted),
            Err(e) => {
                self.publish_failure(request, None, &e).await;
                return Err(e);
            }
        };

        if !self.registry().is_chain_supported(chain_id) {
            warn!(chain_id, "Refusing to resolve an unconfigured chain");
            return Err(SessionError::ChainNotConfigured { chain_id });
        }

        self.store.update(|state| state.loading(chain_id)).await;

        let cell = {
            let mut engines = self.engines.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(engines.entry(chain_id).or_default())
        };

        if let Some(handle) = cell.get() {
            cancel::ensure_active(cancel)?;
            debug!(request, chain_id, stage = %ResolveStage::Cached, "Cipher engine cache hit");
            return self.publish_ready(request, handle.clone()).await;
        }

        // Waiting on another request's construction of this chain stays cancellable
        let constructed = cancellable(cancel, async {
            cell.get_or_try_init(|| self.construct(chain_id, Arc::clone(&rpc), cancel))
                .await
                .map(EngineHandle::clone)
        })
        .await;

        match constructed {
            Ok(handle) => self.publish_ready(request, handle).await,
            Err(e @ SessionError::Aborted) | Err(e @ SessionError::ChainNotConfigured { .. }) => {
                Err(e)
            }
            Err(e) => {
                self.publish_failure(request, Some(chain_id), &e).await;
                Err(e)
            }
        }
    }

    async fn construct(
        &self,
        chain_id: u64,
        rpc: Arc<dyn ChainRpc>,
        cancel: &CancellationToken,
    ) -> Result<EngineHandle, SessionError> {
        if let Some(factory) = self.mock_factory_for(chain_id) {
            debug!(chain_id, stage = %ResolveStage::ProbingMock, "Probing node for mock plugin");
            if let Some(metadata) = self.probe_mock(chain_id, rpc.as_ref(), cancel).await? {
                debug!(chain_id, stage = %ResolveStage::Constructing, kind = "mock", "Building cipher engine");
                let engine = cancellable(
                    cancel,
                    factory.create_mock_engine(chain_id, metadata, Arc::clone(&rpc)),
                )
                .await?;
                info!(chain_id, "Mock cipher engine ready");
                return Ok(EngineHandle::new(chain_id, EngineKind::Mock, engine));
            }
        }

        debug!(chain_id, stage = %ResolveStage::Constructing, kind = "production", "Building cipher engine");
        if self.environment == ExecutionEnvironment::Server {
            return Err(SessionError::SsrNotSupported);
        }

        // Mock-only chains have nothing to fall back to
        let chain = self
            .registry()
            .get_chain(chain_id)
            .cloned()
            .ok_or(SessionError::ChainNotConfigured { chain_id })?;

        self.sdk_initialized
            .get_or_try_init(|| cancellable(cancel, self.production.initialize()))
            .await?;

        let acl_address = chain
            .acl_address()
            .ok_or_else(|| SessionError::InvalidAclAddress {
                chain_id,
                address: chain.contracts.acl.clone(),
            })?;

        let public_key = public_key::load_or_fetch(
            &self.storage,
            self.production.as_ref(),
            &chain,
            acl_address,
            cancel,
        )
        .await?;

        let engine = cancellable(
            cancel,
            self.production.create_engine(ProductionEngineParams {
                chain,
                acl_address,
                public_key,
                rpc,
            }),
        )
        .await?;

        info!(chain_id, acl = ?acl_address, "Production cipher engine ready");
        Ok(EngineHandle::new(chain_id, EngineKind::Production, engine))
    }

    fn mock_factory_for(&self, chain_id: u64) -> Option<&Arc<dyn MockEngineFactory>> {
        if self.registry().is_mock_chain(chain_id) {
            self.mock.as_ref()
        } else {
            None
        }
    }

    /// Relayer metadata if the node runs the FHEVM mock plugin. Probe failures are not
    /// errors: the chain is then treated as a production chain.
    async fn probe_mock(
        &self,
        chain_id: u64,
        rpc: &dyn ChainRpc,
        cancel: &CancellationToken,
    ) -> Result<Option<RelayerMetadata>, SessionError> {
        let version = match cancellable(cancel, rpc.client_version()).await {
            Ok(version) => version,
            Err(SessionError::Aborted) => return Err(SessionError::Aborted),
            Err(e) => {
                warn!(chain_id, error = %e, "Mock probe failed to read client version");
                return Ok(None);
            }
        };

        if !version.to_ascii_lowercase().contains(MOCK_CLIENT_MARKER) {
            debug!(chain_id, client = %version, "Node is not a mock host");
            return Ok(None);
        }

        match cancellable(cancel, rpc.relayer_metadata()).await {
            Ok(metadata) => Ok(Some(metadata)),
            Err(SessionError::Aborted) => Err(SessionError::Aborted),
            Err(e) => {
                warn!(chain_id, error = %e, "Node does not advertise relayer metadata");
                Ok(None)
            }
        }
    }

    fn is_latest(&self, request: u64) -> bool {
        self.sequence.load(Ordering::SeqCst) == request
    }

    /// Last state not owned by an in-flight resolution
    fn restore_point(&self) -> SessionState {
        let current = self.store.state();
        let mut settled = self.settled.lock().unwrap_or_else(PoisonError::into_inner);
        if current.status != SessionStatus::Loading {
            *settled = Some(current.clone());
            return current;
        }
        settled
            .clone()
            .unwrap_or_else(|| SessionState::initial(current.active_chain_id))
    }

    /// A latest request that ends without publishing leaves no `loading` behind.
    /// Older requests in flight can no longer publish, so their `loading` is undone too.
    async fn settle_abandoned(&self, request: u64, restore: SessionState) {
        if !self.is_latest(request) || self.store.state().status != SessionStatus::Loading {
            return;
        }

        self.store
            .update(|state| {
                if self.is_latest(request) && state.status == SessionStatus::Loading {
                    restore
                } else {
                    state.clone()
                }
            })
            .await;
        debug!(request, "Restored session state after unfinished resolution");
    }

    async fn publish_ready(
        &self,
        request: u64,
        handle: EngineHandle,
    ) -> Result<EngineHandle, SessionError> {
        if !self.is_latest(request) {
            debug!(request, chain_id = handle.chain_id(), "Superseded resolution, not publishing");
            return Err(SessionError::Aborted);
        }

        let published = handle.clone();
        self.store.update(move |state| state.ready(published)).await;
        debug!(request, chain_id = handle.chain_id(), stage = %ResolveStage::Ready, "Cipher engine published");
        Ok(handle)
    }

    async fn publish_failure(&self, request: u64, chain_id: Option<u64>, err: &SessionError) {
        error!(request, ?chain_id, code = err.code(), error = %err, stage = %ResolveStage::Error, "Cipher engine resolution failed");
        if !self.is_latest(request) {
            return;
        }

        let recorded = err.clone();
        self.store
            .update(move |state| match chain_id {
                Some(chain_id) => SessionState {
                    active_chain_id: chain_id,
                    ..state.failed(recorded)
                },
                None => state.failed(recorded),
            })
            .await;
    }
}

impl fmt::Debug for InstanceResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceResolver")
            .field("environment", &self.environment)
            .field("cached_chains", &self.cached_chains())
            .field("sdk_initialized", &self.is_sdk_initialized())
            .finish_non_exhaustive()
    }
}
