//! Login protocol over the registry, trust cache and verifier.
//!
//! [`AuthBackend`] is the composition root: it owns the role registry, the
//! trust cache and the authority client handle, and exposes the two login
//! paths plus role management. Login failures caused by the presented
//! credential are deliberately indistinguishable to the caller: the
//! internal cause is logged and the response is a bare
//! [`AuthzError::Unauthorized`] so the endpoint cannot be used as an oracle
//! for binding names, key ids or policy contents.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use trustgate_storage::StorageBackend;

use crate::{
    authority::AuthorityClient,
    config::Config,
    error::AuthzError,
    registry::{RoleBinding, RoleParams, RoleRegistry},
    trust::TrustCache,
    verifier,
};

/// The result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Policies attached to the lease.
    pub policies: Vec<String>,
    /// Lease TTL (zero means backend default).
    pub ttl: Duration,
    /// Lease max TTL (zero means backend default).
    pub max_ttl: Duration,
    /// Whether the lease may be renewed.
    pub renewable: bool,
    /// Audit metadata: binding name, token domain, principal when present.
    pub metadata: BTreeMap<String, String>,
}

/// Token-verification auth backend.
pub struct AuthBackend {
    registry: RoleRegistry,
    trust: Arc<TrustCache>,
    authority: Arc<dyn AuthorityClient>,
    config: Config,
}

impl AuthBackend {
    /// Builds a backend over the given storage and authority client.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidConfig`] if the configuration fails
    /// validation.
    pub fn new(
        config: Config,
        storage: Arc<dyn StorageBackend>,
        authority: Arc<dyn AuthorityClient>,
    ) -> Result<Self, AuthzError> {
        let trust = TrustCache::new(config.authority.clone(), Arc::clone(&authority))?;
        Ok(Self { registry: RoleRegistry::new(storage), trust, authority, config })
    }

    /// Fetches trust data once and launches the refresh loops.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::FetchFailed`] if the initial fetch fails; the
    /// loops are not started in that case.
    pub async fn start(&self) -> Result<(), AuthzError> {
        self.trust.prime().await?;
        self.trust.start();
        Ok(())
    }

    /// Stops the refresh loops.
    pub async fn shutdown(&self) {
        self.trust.shutdown().await;
    }

    /// Authenticates `token` against the binding called `name`.
    ///
    /// The token must claim the binding's external role and that role must
    /// be granted the binding's action on its resource (both falling back to
    /// the configured defaults). Login never mutates storage.
    ///
    /// # Errors
    ///
    /// - [`AuthzError::MissingName`] — empty name.
    /// - [`AuthzError::MissingToken`] — empty token.
    /// - [`AuthzError::Unauthorized`] — unknown binding or any token
    ///   verification failure (cause logged, not returned).
    /// - [`AuthzError::Storage`] — backend failure.
    pub async fn login(&self, name: &str, token: &str) -> Result<Lease, AuthzError> {
        if name.trim().is_empty() {
            return Err(AuthzError::MissingName);
        }
        if token.trim().is_empty() {
            return Err(AuthzError::MissingToken);
        }

        let binding = self.resolve_for_login(name).await?;
        self.verify_against_binding(&binding, token)
    }

    /// Authenticates by exchanging an authority credential for a role token.
    ///
    /// The backend asks the authority to mint a token for the binding's role
    /// on the caller's behalf, then runs the same verification path as
    /// [`login`](Self::login). Exchange failures collapse to
    /// [`AuthzError::Unauthorized`] like any other credential failure.
    ///
    /// # Errors
    ///
    /// As for [`login`](Self::login); an empty credential is
    /// [`AuthzError::MissingToken`].
    pub async fn login_with_credential(
        &self,
        name: &str,
        credential: &str,
    ) -> Result<Lease, AuthzError> {
        if name.trim().is_empty() {
            return Err(AuthzError::MissingName);
        }
        if credential.trim().is_empty() {
            return Err(AuthzError::MissingToken);
        }

        let binding = self.resolve_for_login(name).await?;

        let authority_cfg = &self.config.authority;
        let token = match self
            .authority
            .fetch_signed_token(
                &authority_cfg.domain,
                &binding.role,
                &authority_cfg.credential_header,
                credential,
            )
            .await
        {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!(name = %binding.name, error = %err, "credential exchange failed");
                return Err(AuthzError::Unauthorized);
            },
        };

        self.verify_against_binding(&binding, &token)
    }

    async fn resolve_for_login(&self, name: &str) -> Result<RoleBinding, AuthzError> {
        match self.registry.resolve(name).await? {
            Some(binding) => Ok(binding),
            None => {
                // Absent bindings and bad tokens must be indistinguishable.
                tracing::warn!(name = %name, "login against unknown binding");
                Err(AuthzError::Unauthorized)
            },
        }
    }

    fn verify_against_binding(&self, binding: &RoleBinding, token: &str) -> Result<Lease, AuthzError> {
        let defaults = &self.config.authority.policy;
        let action = binding.action.as_deref().unwrap_or(&defaults.action);
        let resource = binding.resource.as_deref().unwrap_or(&defaults.resource);

        let snapshot = self.trust.snapshot();
        let verified = match verifier::verify(token, &binding.role, action, resource, &snapshot) {
            Ok(verified) => verified,
            Err(err) if err.is_verification_failure() => {
                tracing::warn!(name = %binding.name, error = %err, "token verification failed");
                return Err(AuthzError::Unauthorized);
            },
            Err(err) => return Err(err),
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("name".to_string(), binding.name.clone());
        metadata.insert("domain".to_string(), verified.domain.clone());
        if let Some(principal) = &verified.principal {
            metadata.insert("principal".to_string(), principal.clone());
        }

        tracing::info!(
            name = %binding.name,
            domain = %verified.domain,
            principal = verified.principal.as_deref().unwrap_or("-"),
            "login succeeded"
        );

        Ok(Lease {
            policies: binding.token_policies.clone(),
            ttl: Duration::from_secs(binding.token_ttl_secs),
            max_ttl: Duration::from_secs(binding.token_max_ttl_secs),
            renewable: true,
            metadata,
        })
    }

    /// Creates or updates a role binding. Unlike login, role management
    /// returns precise errors.
    ///
    /// # Errors
    ///
    /// See [`RoleRegistry::write`].
    pub async fn write_role(&self, name: &str, params: RoleParams) -> Result<(), AuthzError> {
        self.registry.write(name, params).await
    }

    /// Reads a role binding.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::UnknownRole`] when the binding does not exist,
    /// plus the [`RoleRegistry::resolve`] errors.
    pub async fn read_role(&self, name: &str) -> Result<RoleBinding, AuthzError> {
        self.registry
            .resolve(name)
            .await?
            .ok_or_else(|| AuthzError::unknown_role(name))
    }

    /// Deletes a role binding; deleting an absent binding succeeds.
    ///
    /// # Errors
    ///
    /// See [`RoleRegistry::delete`].
    pub async fn delete_role(&self, name: &str) -> Result<(), AuthzError> {
        self.registry.delete(name).await
    }

    /// Lists role binding names.
    ///
    /// # Errors
    ///
    /// See [`RoleRegistry::list`].
    pub async fn list_roles(&self) -> Result<Vec<String>, AuthzError> {
        self.registry.list().await
    }

    /// The trust cache backing this backend.
    #[must_use]
    pub fn trust(&self) -> &Arc<TrustCache> {
        &self.trust
    }
}
