//! Storage error types and result alias.
//!
//! All storage backends map their internal errors into [`StorageError`].
//! Errors preserve their source chain via the `#[source]` attribute so
//! callers can log the full context.

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]` — new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Connection or network error.
    ///
    /// The backend could not be reached (connection refused, DNS failure,
    /// broken pipe). Transient — the operation may succeed if retried.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying error that caused this connection failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Serialization or deserialization error.
    ///
    /// Data could not be decoded when retrieved. Typically indicates data
    /// corruption or a schema incompatibility; not transient.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error that caused serialization to fail.
        #[source]
        source: Option<BoxError>,
    },

    /// Internal storage backend error.
    ///
    /// Catch-all for backend-specific errors that don't fit other categories.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Operation exceeded its configured time limit.
    #[error("Operation timeout")]
    Timeout,
}

impl StorageError {
    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Whether this error indicates a condition that may clear on retry.
    ///
    /// Connection and timeout failures are transient; serialization and
    /// internal errors are definitive responses from the backend.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::connection("refused");
        assert_eq!(err.to_string(), "Connection error: refused");

        let err = StorageError::timeout();
        assert_eq!(err.to_string(), "Operation timeout");

        let err = StorageError::serialization("bad json");
        assert_eq!(err.to_string(), "Serialization error: bad json");
    }

    #[test]
    fn test_transient_classification() {
        assert!(StorageError::connection("x").is_transient());
        assert!(StorageError::timeout().is_transient());
        assert!(!StorageError::serialization("x").is_transient());
        assert!(!StorageError::internal("x").is_transient());
    }

    #[test]
    fn test_source_chain_preserved() {
        use std::error::Error;

        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = StorageError::connection_with_source("backend unreachable", inner);

        let source = err.source().expect("source chain must be preserved");
        assert_eq!(source.to_string(), "refused");
    }
}
