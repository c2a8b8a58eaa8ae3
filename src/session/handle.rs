// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::engine::HANDLE_BYTES;
use crate::error::SessionError;
use tracing::warn;

/// `0x` plus two hex characters per handle byte
pub const HANDLE_HEX_LEN: usize = 2 + HANDLE_BYTES * 2;

/// Reject handles that are empty, unprefixed or not hex. An unexpected length is only
/// logged; the engine decides whether it can use the handle.
pub fn validate_handle(handle: &str) -> Result<(), SessionError> {
    let invalid = |reason: &str| SessionError::InvalidHandle {
        handle: handle.to_string(),
        reason: reason.to_string(),
    };

    if handle.is_empty() {
        return Err(invalid("must be a non-empty string"));
    }

    let Some(body) = handle.strip_prefix("0x") else {
        return Err(invalid("must start with 0x"));
    };

    if body.is_empty() || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("must be valid hex"));
    }

    if handle.len() != HANDLE_HEX_LEN {
        warn!(
            handle,
            length = handle.len(),
            expected = HANDLE_HEX_LEN,
            "Handle has an unexpected length"
        );
    }
    Ok(())
}
