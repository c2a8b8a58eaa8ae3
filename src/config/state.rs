// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::engine::EngineHandle;
use crate::error::SessionError;
use serde::{Deserialize, Serialize};

/// Version of the persisted `{activeChainId}` projection
pub const PERSIST_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Loading,
    Ready,
    Error,
}

/// Snapshot of the session.
///
/// Invariants:
/// - `status == Ready` iff `engine` is present and bound to `active_chain_id`
/// - `status == Error` iff `last_error` is present and `engine` is absent
#[derive(Debug, Clone)]
pub struct SessionState {
    pub active_chain_id: u64,
    pub engine: Option<EngineHandle>,
    pub status: SessionStatus,
    pub last_error: Option<SessionError>,
}

impl SessionState {
    pub fn initial(active_chain_id: u64) -> Self {
        Self {
            active_chain_id,
            engine: None,
            status: SessionStatus::Idle,
            last_error: None,
        }
    }

    pub fn loading(&self, chain_id: u64) -> Self {
        Self {
            active_chain_id: chain_id,
            engine: None,
            status: SessionStatus::Loading,
            last_error: None,
        }
    }

    pub fn ready(&self, engine: EngineHandle) -> Self {
        Self {
            active_chain_id: engine.chain_id(),
            engine: Some(engine),
            status: SessionStatus::Ready,
            last_error: None,
        }
    }

    pub fn failed(&self, error: SessionError) -> Self {
        Self {
            active_chain_id: self.active_chain_id,
            engine: None,
            status: SessionStatus::Error,
            last_error: Some(error),
        }
    }

    /// Checks the status/engine/error invariants
    pub fn is_well_formed(&self) -> bool {
        let bound = self
            .engine
            .as_ref()
            .map(|engine| engine.chain_id() == self.active_chain_id)
            .unwrap_or(false);

        match self.status {
            SessionStatus::Ready => bound && self.last_error.is_none(),
            SessionStatus::Error => self.last_error.is_some() && self.engine.is_none(),
            SessionStatus::Idle | SessionStatus::Loading => {
                self.engine.is_none() && self.last_error.is_none()
            }
        }
    }

    pub fn engine_for(&self, chain_id: u64) -> Option<&EngineHandle> {
        match (&self.status, &self.engine) {
            (SessionStatus::Ready, Some(engine)) if engine.chain_id() == chain_id => Some(engine),
            _ => None,
        }
    }

    /// Ready engine for the active chain
    pub fn ready_engine(&self) -> Option<&EngineHandle> {
        self.engine_for(self.active_chain_id)
    }

    pub fn partial(&self) -> PersistedSession {
        PersistedSession {
            active_chain_id: self.active_chain_id,
        }
    }

    /// Same shape and the same engine/error identities
    pub fn same_as(&self, other: &SessionState) -> bool {
        let engines_match = match (&self.engine, &other.engine) {
            (Some(a), Some(b)) => a == b,
            (None, None) => true,
            _ => false,
        };
        let errors_match = match (&self.last_error, &other.last_error) {
            (Some(a), Some(b)) => a.same_as(b),
            (None, None) => true,
            _ => false,
        };
        self.active_chain_id == other.active_chain_id
            && self.status == other.status
            && engines_match
            && errors_match
    }
}

/// Partial update applied with [`ConfigStore::set_state`](super::ConfigStore::set_state)
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub active_chain_id: Option<u64>,
    pub engine: Option<Option<EngineHandle>>,
    pub status: Option<SessionStatus>,
    pub last_error: Option<Option<SessionError>>,
}

impl StatePatch {
    pub fn apply(self, state: &SessionState) -> SessionState {
        SessionState {
            active_chain_id: self.active_chain_id.unwrap_or(state.active_chain_id),
            engine: self.engine.unwrap_or_else(|| state.engine.clone()),
            status: self.status.unwrap_or(state.status),
            last_error: self.last_error.unwrap_or_else(|| state.last_error.clone()),
        }
    }
}

/// Durable projection of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub active_chain_id: u64,
}

/// On-storage envelope: `{"state":{"activeChainId":..},"version":1}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEnvelope {
    pub state: PersistedSession,
    pub version: u32,
}
