// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::Session;
use crate::engine::EngineHandle;
use crate::error::SessionError;
use crate::rpc::Connection;
use tokio_util::sync::CancellationToken;

impl Session {
    /// Resolve and publish the cipher engine for the chain behind `connection`.
    ///
    /// The resolver records failures itself, so the result is returned as is.
    pub async fn create_instance(
        &self,
        connection: impl Into<Connection>,
        cancel: &CancellationToken,
    ) -> Result<EngineHandle, SessionError> {
        self.resolver.resolve(connection.into(), cancel).await
    }
}
