//! Identity-authority client capability.
//!
//! The wire protocol of the remote authority is out of scope for this crate;
//! consumers supply an implementation of [`AuthorityClient`] (typically an
//! HTTPS client against the authority's key, policy, and token endpoints).
//! The trust cache and login protocol are written against this trait only.
//!
//! A configurable in-memory implementation lives in
//! [`testutil::StaticAuthority`](crate::testutil::StaticAuthority).

use async_trait::async_trait;

use crate::{
    error::AuthzError,
    trust::{PolicySet, SigningKeySet},
};

/// Client for the remote identity authority.
#[async_trait]
pub trait AuthorityClient: Send + Sync {
    /// Fetches the authority's current signing key set.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::FetchFailed`] when the authority is unreachable
    /// or returns an unusable response.
    async fn fetch_public_keys(&self) -> Result<SigningKeySet, AuthzError>;

    /// Fetches the authorization policy for a trust domain.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::FetchFailed`] when the authority is unreachable
    /// or returns an unusable response.
    async fn fetch_policy(&self, domain: &str) -> Result<PolicySet, AuthzError>;

    /// Obtains a signed role token on behalf of a caller.
    ///
    /// The caller's own credential is presented to the authority under the
    /// configured `header` name; the authority answers with a role token for
    /// `role` in `domain` that can then be verified locally.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::FetchFailed`] when the authority is unreachable
    /// or refuses to issue a token for the credential.
    async fn fetch_signed_token(
        &self,
        domain: &str,
        role: &str,
        header: &str,
        credential: &str,
    ) -> Result<String, AuthzError>;
}
