//! Authorization error types.
//!
//! This module defines the errors produced by configuration validation,
//! trust refresh, token verification, role management, and login.
//!
//! Verification failures ([`AuthzError::is_verification_failure`]) are
//! collapsed to a bare [`AuthzError::Unauthorized`] at the login boundary so
//! callers cannot probe which check rejected their token. Role-management
//! operations return precise errors; they are administrative and carry no
//! oracle-attack concern.

use thiserror::Error;

/// Authorization and verification errors.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]` — new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthzError {
    /// Configuration is invalid. Fatal at startup; the backend must not serve.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A fetch from the identity authority failed.
    ///
    /// Transient: refresh loops retry on the next scheduled tick and keep
    /// serving the prior trust data. Never surfaced to login callers.
    #[error("Authority fetch failed: {0}")]
    FetchFailed(String),

    /// Token cannot be parsed into the role-token wire format.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Token expiry timestamp is in the past.
    #[error("Token expired")]
    TokenExpired,

    /// Signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token's key id is not present in the current signing key set.
    #[error("Signing key not found: {key_id}")]
    KeyNotFound {
        /// Key id named by the token.
        key_id: String,
    },

    /// No claimed role is granted the requested action on the resource.
    #[error("Policy denied: {0}")]
    PolicyDenied(String),

    /// The target role is absent from the token's claimed roles.
    #[error("Role not claimed by token: {role}")]
    RoleMismatch {
        /// The role the caller asked to assume.
        role: String,
    },

    /// Caller omitted the role-binding name.
    #[error("Missing name")]
    MissingName,

    /// Caller omitted the token.
    #[error("Missing token")]
    MissingToken,

    /// No role binding is registered under the given name.
    #[error("Unknown role: {name}")]
    UnknownRole {
        /// The binding name that was looked up.
        name: String,
    },

    /// Generic login rejection. Deliberately carries no detail.
    #[error("Unauthorized")]
    Unauthorized,

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(#[from] trustgate_storage::StorageError),
}

impl AuthzError {
    /// Creates a new `InvalidConfig` error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Creates a new `FetchFailed` error.
    #[must_use]
    pub fn fetch_failed(message: impl Into<String>) -> Self {
        Self::FetchFailed(message.into())
    }

    /// Creates a new `MalformedToken` error.
    #[must_use]
    pub fn malformed_token(message: impl Into<String>) -> Self {
        Self::MalformedToken(message.into())
    }

    /// Creates a new `KeyNotFound` error.
    #[must_use]
    pub fn key_not_found(key_id: impl Into<String>) -> Self {
        Self::KeyNotFound { key_id: key_id.into() }
    }

    /// Creates a new `PolicyDenied` error.
    #[must_use]
    pub fn policy_denied(message: impl Into<String>) -> Self {
        Self::PolicyDenied(message.into())
    }

    /// Creates a new `RoleMismatch` error.
    #[must_use]
    pub fn role_mismatch(role: impl Into<String>) -> Self {
        Self::RoleMismatch { role: role.into() }
    }

    /// Creates a new `UnknownRole` error.
    #[must_use]
    pub fn unknown_role(name: impl Into<String>) -> Self {
        Self::UnknownRole { name: name.into() }
    }

    /// Whether this error is a token-verification failure.
    ///
    /// All verification failures collapse to [`AuthzError::Unauthorized`]
    /// at the login boundary; the internal cause is logged, never returned.
    #[must_use]
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Self::MalformedToken(_)
                | Self::TokenExpired
                | Self::InvalidSignature
                | Self::KeyNotFound { .. }
                | Self::PolicyDenied(_)
                | Self::RoleMismatch { .. }
        )
    }
}

/// Result type alias for authorization operations.
pub type Result<T> = std::result::Result<T, AuthzError>;
