// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod adapter;
pub mod codec;
pub mod file;
pub mod namespaced;

// Re-export main types for convenience
pub use adapter::{MemoryStorage, NoopStorage, StorageAdapter, StorageCalls, StorageError};
pub use codec::CodecError;
pub use file::FileStorage;
pub use namespaced::{SessionStorage, DEFAULT_STORAGE_PREFIX};
