// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::error::SessionError;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Run one I/O step under `cancel`.
///
/// The token is checked before the step starts, raced against it, and checked again
/// after it completes, so a cancellation that lands while the step resolves still wins.
pub async fn cancellable<T, E, F>(cancel: &CancellationToken, step: F) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<SessionError>,
{
    ensure_active(cancel)?;

    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(SessionError::Aborted),
        output = step => output,
    };

    ensure_active(cancel)?;
    output.map_err(Into::into)
}

pub fn ensure_active(cancel: &CancellationToken) -> Result<(), SessionError> {
    if cancel.is_cancelled() {
        Err(SessionError::Aborted)
    } else {
        Ok(())
    }
}
