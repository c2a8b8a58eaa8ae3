// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Session Config Store
//!
//! Single source of truth for the session: which chain is active and which cipher
//! engine (if any) is bound to it.
//!
//! ## Persistence
//!
//! Only the `{activeChainId}` projection is durable. It is written through the
//! namespaced storage on every update once the store has been hydrated, under the key
//! `<prefix>.store`. Updates commit in order: the next one waits until the previous one
//! has been written. Hydration validates the stored envelope: a different schema version
//! or a chain that is no longer configured falls back to the default chain.
//!
//! ## Self-healing
//!
//! An update producing a state that breaks the status/engine/error invariants is not
//! applied; the store resets to its initial idle state instead. Persisted state is a
//! cache and is never trusted over the configuration.
//!
//! ## Server-side rendering
//!
//! With `ssr` enabled the store starts without reading storage and does not write to it
//! until [`ConfigStore::rehydrate`] runs once on the client.

use super::chains::ChainRegistry;
use super::state::{PersistedEnvelope, SessionState, StatePatch, PERSIST_VERSION};
use crate::error::SessionError;
use crate::storage::SessionStorage;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

pub const STORE_KEY: &str = "store";

type Listener = Arc<Mutex<dyn FnMut(&SessionState) + Send>>;
type EqualityFn<T> = Box<dyn Fn(&T, &T) -> bool + Send>;

/// Options for [`ConfigStore::subscribe`]
pub struct SubscribeOptions<T> {
    /// Call the listener once right away with the current selection
    pub emit_immediately: bool,
    /// Custom equality; defaults to `PartialEq`
    pub equality_fn: Option<EqualityFn<T>>,
}

impl<T> Default for SubscribeOptions<T> {
    fn default() -> Self {
        Self {
            emit_immediately: false,
            equality_fn: None,
        }
    }
}

impl<T> SubscribeOptions<T> {
    pub fn emit_immediately() -> Self {
        Self {
            emit_immediately: true,
            equality_fn: None,
        }
    }

    pub fn with_equality(mut self, equality_fn: impl Fn(&T, &T) -> bool + Send + 'static) -> Self {
        self.equality_fn = Some(Box::new(equality_fn));
        self
    }
}

struct StoreInner {
    state: RwLock<SessionState>,
    /// Serializes updates so listeners and storage see them in state order
    commit: AsyncMutex<()>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
    initial_chain_id: AtomicU64,
    hydrated: AtomicBool,
    ssr: bool,
    registry: ChainRegistry,
    storage: SessionStorage,
    watch_tx: watch::Sender<SessionState>,
}

#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<StoreInner>,
}

impl ConfigStore {
    /// Build a store without touching storage. Use [`ConfigStore::create`] unless the
    /// caller drives hydration itself.
    pub fn new(
        registry: ChainRegistry,
        storage: SessionStorage,
        ssr: bool,
    ) -> Result<Self, SessionError> {
        let initial_chain_id = registry.default_chain_id().ok_or_else(|| {
            SessionError::InvalidConfig("at least one chain must be configured".to_string())
        })?;
        let initial = SessionState::initial(initial_chain_id);
        let (watch_tx, _) = watch::channel(initial.clone());

        Ok(Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(initial),
                commit: AsyncMutex::new(()),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
                initial_chain_id: AtomicU64::new(initial_chain_id),
                hydrated: AtomicBool::new(false),
                ssr,
                registry,
                storage,
                watch_tx,
            }),
        })
    }

    /// Build a store and, unless in SSR mode, load the persisted projection
    pub async fn create(
        registry: ChainRegistry,
        storage: SessionStorage,
        ssr: bool,
    ) -> Result<Self, SessionError> {
        let store = Self::new(registry, storage, ssr)?;
        if !ssr {
            store.rehydrate().await;
        }
        Ok(store)
    }

    pub fn state(&self) -> SessionState {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.inner.registry
    }

    pub fn storage(&self) -> &SessionStorage {
        &self.inner.storage
    }

    pub fn is_ssr(&self) -> bool {
        self.inner.ssr
    }

    pub fn is_hydrated(&self) -> bool {
        self.inner.hydrated.load(Ordering::SeqCst)
    }

    pub async fn set_state(&self, patch: StatePatch) -> SessionState {
        self.update(|state| patch.apply(state)).await
    }

    /// Apply `updater` to the current state, notify subscribers and persist the
    /// durable projection. Returns the state actually stored.
    ///
    /// Overlapping updates are applied, notified and persisted one at a time, so the
    /// stored projection always matches the latest state.
    pub async fn update<F>(&self, updater: F) -> SessionState
    where
        F: FnOnce(&SessionState) -> SessionState,
    {
        let _commit = self.inner.commit.lock().await;
        let next = {
            let mut guard = self
                .inner
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let candidate = updater(&*guard);
            let next = if candidate.is_well_formed() {
                candidate
            } else {
                debug!(
                    status = ?candidate.status,
                    "Malformed session state, resetting to initial state"
                );
                SessionState::initial(self.inner.initial_chain_id.load(Ordering::SeqCst))
            };
            *guard = next.clone();
            next
        };

        self.notify(&next);
        self.persist(&next).await;
        next
    }

    /// Receiver that observes every stored state
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.inner.watch_tx.subscribe()
    }

    /// Call `listener(current, previous)` whenever `selector(state)` changes
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
        let SubscribeOptions {
            emit_immediately,
            equality_fn,
        } = options;
        let equality_fn: EqualityFn<T> = match equality_fn {
            Some(equality_fn) => equality_fn,
            None => Box::new(|a: &T, b: &T| a == b),
        };
        self.subscribe_with(selector, listener, emit_immediately, equality_fn)
    }

    /// Like [`ConfigStore::subscribe`] for selections without `PartialEq`
    pub fn subscribe_with<T, S, L, E>(
        &self,
        selector: S,
        mut listener: L,
        emit_immediately: bool,
        equality_fn: E,
    ) -> Subscription
    where
        T: Send + 'static,
        S: Fn(&SessionState) -> T + Send + 'static,
        L: FnMut(&T, &T) + Send + 'static,
        E: Fn(&T, &T) -> bool + Send + 'static,
    {
        let mut current = selector(&self.state());
        if emit_immediately {
            listener(&current, &current);
        }

        let notify = move |state: &SessionState| {
            let next = selector(state);
            if !equality_fn(&current, &next) {
                let previous = std::mem::replace(&mut current, next);
                listener(&current, &previous);
            }
        };

        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        let listener: Listener = Arc::new(Mutex::new(notify));
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));

        Subscription {
            id,
            store: Arc::downgrade(&self.inner),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Load the persisted projection once. Later calls are no-ops and return `false`.
    pub async fn rehydrate(&self) -> bool {
        if self.inner.hydrated.swap(true, Ordering::SeqCst) {
            return false;
        }

        let envelope = match self.inner.storage.get::<PersistedEnvelope>(STORE_KEY).await {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted session, using defaults");
                None
            }
        };

        let Some(chain_id) = self.merge(envelope) else {
            return false;
        };

        self.inner.initial_chain_id.store(chain_id, Ordering::SeqCst);
        let applied = self
            .update(|state| {
                if state.engine.is_none() && state.last_error.is_none() {
                    SessionState {
                        active_chain_id: chain_id,
                        ..state.clone()
                    }
                } else {
                    state.clone()
                }
            })
            .await;

        info!(
            active_chain_id = applied.active_chain_id,
            "Session rehydrated from storage"
        );
        applied.active_chain_id == chain_id
    }

    /// Validate a persisted envelope against the current configuration
    fn merge(&self, envelope: Option<PersistedEnvelope>) -> Option<u64> {
        let envelope = envelope?;
        if envelope.version != PERSIST_VERSION {
            warn!(
                found = envelope.version,
                expected = PERSIST_VERSION,
                "Discarding persisted session with unknown version"
            );
            return None;
        }

        let chain_id = envelope.state.active_chain_id;
        if self.inner.registry.is_chain_supported(chain_id) {
            Some(chain_id)
        } else {
            let fallback = self.inner.registry.default_chain_id()?;
            warn!(
                persisted = chain_id,
                fallback, "Persisted chain is no longer configured, falling back"
            );
            Some(fallback)
        }
    }

    fn notify(&self, state: &SessionState) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for entry in listeners {
            let mut listener = entry.lock().unwrap_or_else(PoisonError::into_inner);
            (&mut *listener)(state);
        }

        self.inner.watch_tx.send_replace(state.clone());
    }

    async fn persist(&self, state: &SessionState) {
        if !self.is_hydrated() {
            return;
        }

        let envelope = PersistedEnvelope {
            state: state.partial(),
            version: PERSIST_VERSION,
        };
        if let Err(e) = self.inner.storage.set(STORE_KEY, &envelope).await {
            warn!(error = %e, "Failed to persist session state");
        }
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("state", &self.state())
            .field("ssr", &self.inner.ssr)
            .finish_non_exhaustive()
    }
}

/// Registration returned by [`ConfigStore::subscribe`]
#[must_use = "dropping a Subscription keeps the listener; call unsubscribe() to remove it"]
pub struct Subscription {
    id: u64,
    store: Weak<StoreInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(store) = self.store.upgrade() {
            store
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}
