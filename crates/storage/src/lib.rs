//! # Trustgate Storage
//!
//! Key-value storage abstraction for the trustgate credential broker.
//!
//! This crate provides:
//! - **[`StorageBackend`]**: the async key→bytes trait all backends implement
//! - **[`MemoryBackend`]**: in-memory reference implementation for tests and
//!   development
//! - **[`StorageError`]**: the canonical error taxonomy backends map into
//!
//! Keys and values are opaque bytes; serialization policy belongs to the
//! layers built on top (e.g. the role registry in `trustgate-authz`). All
//! operations are atomic per key.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Storage backend trait definition.
pub mod backend;
/// Storage error types.
pub mod error;
/// In-memory backend.
pub mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
