//! Storage backend trait definition.
//!
//! This module defines the [`StorageBackend`] trait, the core abstraction
//! for durable key-value storage in trustgate. The interface is a minimal
//! key→bytes map with list-by-prefix:
//!
//! - **Keys and values are bytes**: no assumptions about serialization format
//! - **Async by default**: all operations are async for non-blocking I/O
//! - **Atomic per key**: a read observes a whole previously written value,
//!   never a partial write
//!
//! Domain-specific logic (role bindings, key prefixes) lives in the layers
//! built on top of this trait, not in the storage backends. See
//! [`MemoryBackend`](crate::MemoryBackend) for a reference implementation.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageResult;

/// Abstract storage backend for key-value operations.
///
/// Backends are expected to be thread-safe (`Send + Sync`) and support
/// concurrent operations. Callers that need read-modify-write atomicity
/// across operations must provide their own locking; each individual
/// operation is atomic per key.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieves a value by key.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(bytes))` if the key exists
    /// - `Ok(None)` if the key doesn't exist
    /// - `Err(...)` on storage errors
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Stores a key-value pair, overwriting any existing value.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()>;

    /// Deletes a key.
    ///
    /// Deleting a key that does not exist is a no-op (returns `Ok(())`).
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Lists all keys starting with the given prefix, in key order.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn list_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<Vec<u8>>>;
}
