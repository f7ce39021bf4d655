//! Test helpers: key pairs, token minting and an in-memory authority.
//!
//! Available to integration tests and downstream crates via the `testutil`
//! feature. Nothing here is suitable for production use; tokens are minted
//! locally and the authority is a configurable stub.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use parking_lot::Mutex;
use rand_core::OsRng;
use zeroize::Zeroizing;

use crate::{
    authority::AuthorityClient,
    config::{AuthorityConfig, PolicyDefaults, DEFAULT_CREDENTIAL_HEADER},
    error::AuthzError,
    token::TOKEN_VERSION,
    trust::{PolicyRule, PolicySet, SigningKeySet},
};

/// An Ed25519 key pair for minting test tokens.
pub struct TestKeyPair {
    /// Key id the pair publishes under.
    pub key_id: String,
    /// Public key material, base64url without padding.
    pub public_b64: String,
    signing: SigningKey,
}

impl TestKeyPair {
    /// Generates a fresh random pair under `key_id`.
    #[must_use]
    pub fn generate(key_id: impl Into<String>) -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        Self::from_signing_key(key_id, signing)
    }

    /// Builds a deterministic pair from a 32-byte seed.
    #[must_use]
    pub fn from_seed(key_id: impl Into<String>, seed: [u8; 32]) -> Self {
        let seed = Zeroizing::new(seed);
        Self::from_signing_key(key_id, SigningKey::from_bytes(&seed))
    }

    fn from_signing_key(key_id: impl Into<String>, signing: SigningKey) -> Self {
        let public_b64 = URL_SAFE_NO_PAD.encode(signing.verifying_key().as_bytes());
        Self { key_id: key_id.into(), public_b64, signing }
    }

    /// The verifying half of the pair.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    fn sign(&self, message: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(self.signing.sign(message).to_bytes())
    }
}

/// Builder for signed test tokens.
pub struct TokenBuilder {
    domain: String,
    roles: Vec<String>,
    principal: Option<String>,
    issued_at: Option<i64>,
    expiry: i64,
    extra_fields: Vec<(String, String)>,
}

impl TokenBuilder {
    /// Starts a token for `domain`, expiring one hour from now.
    #[must_use]
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            roles: Vec::new(),
            principal: None,
            issued_at: None,
            expiry: chrono::Utc::now().timestamp() + 3600,
            extra_fields: Vec::new(),
        }
    }

    /// Sets the claimed roles.
    #[must_use]
    pub fn roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| (*r).to_string()).collect();
        self
    }

    /// Sets the principal field.
    #[must_use]
    pub fn principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Sets the issue time (Unix seconds).
    #[must_use]
    pub fn issued_at(mut self, issued_at: i64) -> Self {
        self.issued_at = Some(issued_at);
        self
    }

    /// Sets the expiry time (Unix seconds).
    #[must_use]
    pub fn expires_at(mut self, expiry: i64) -> Self {
        self.expiry = expiry;
        self
    }

    /// Adds an unrecognized field (format-evolution tests).
    #[must_use]
    pub fn extra_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_fields.push((key.into(), value.into()));
        self
    }

    /// Signs the token with `pair` and returns the wire form.
    #[must_use]
    pub fn sign(self, pair: &TestKeyPair) -> String {
        let mut unsigned = format!("v={TOKEN_VERSION};d={};r={}", self.domain, self.roles.join(","));
        if let Some(principal) = &self.principal {
            unsigned.push_str(&format!(";p={principal}"));
        }
        if let Some(issued_at) = self.issued_at {
            unsigned.push_str(&format!(";t={issued_at}"));
        }
        unsigned.push_str(&format!(";e={}", self.expiry));
        for (key, value) in &self.extra_fields {
            unsigned.push_str(&format!(";{key}={value}"));
        }
        unsigned.push_str(&format!(";k={}", pair.key_id));

        let signature = pair.sign(unsigned.as_bytes());
        format!("{unsigned};s={signature}")
    }
}

#[derive(Default)]
struct AuthorityState {
    keys: Vec<(String, String)>,
    rules: Vec<(String, PolicyRule)>,
    exchange_tokens: HashMap<String, String>,
    last_exchange: Option<(String, String, String)>,
    fail_keys: bool,
    fail_policy: bool,
    fetch_delay: Duration,
}

/// In-memory [`AuthorityClient`] with failure injection.
#[derive(Default)]
pub struct StaticAuthority {
    state: Mutex<AuthorityState>,
}

impl StaticAuthority {
    /// Creates an authority with no keys, no policy and no exchangeable
    /// credentials.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the published key set.
    pub fn set_keys(&self, pairs: &[&TestKeyPair]) {
        self.state.lock().keys =
            pairs.iter().map(|p| (p.key_id.clone(), p.public_b64.clone())).collect();
    }

    /// Adds an allow rule to the published policy.
    pub fn allow(&self, domain: &str, role: &str, action: &str, resource: &str) {
        self.state
            .lock()
            .rules
            .push((domain.to_string(), PolicyRule::allow(role, action, resource)));
    }

    /// Adds a deny rule to the published policy.
    pub fn deny(&self, domain: &str, role: &str, action: &str, resource: &str) {
        self.state
            .lock()
            .rules
            .push((domain.to_string(), PolicyRule::deny(role, action, resource)));
    }

    /// Registers a credential the authority will exchange for `token`.
    pub fn grant_token(&self, credential: &str, token: &str) {
        self.state
            .lock()
            .exchange_tokens
            .insert(credential.to_string(), token.to_string());
    }

    /// Makes key fetches fail (or succeed again).
    pub fn fail_key_fetches(&self, fail: bool) {
        self.state.lock().fail_keys = fail;
    }

    /// Makes policy fetches fail (or succeed again).
    pub fn fail_policy_fetches(&self, fail: bool) {
        self.state.lock().fail_policy = fail;
    }

    /// Delays every fetch, for cancellation and non-blocking tests.
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.state.lock().fetch_delay = delay;
    }

    /// The `(domain, role, header)` of the most recent token exchange.
    #[must_use]
    pub fn last_exchange(&self) -> Option<(String, String, String)> {
        self.state.lock().last_exchange.clone()
    }

    async fn delay(&self) {
        let delay = self.state.lock().fetch_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl AuthorityClient for StaticAuthority {
    async fn fetch_public_keys(&self) -> Result<SigningKeySet, AuthzError> {
        self.delay().await;
        let keys = {
            let state = self.state.lock();
            if state.fail_keys {
                return Err(AuthzError::fetch_failed("injected key fetch failure"));
            }
            state.keys.clone()
        };

        let mut set = SigningKeySet::new();
        for (key_id, material) in keys {
            set.insert(key_id, &material)?;
        }
        Ok(set)
    }

    async fn fetch_policy(&self, domain: &str) -> Result<PolicySet, AuthzError> {
        self.delay().await;
        let rules = {
            let state = self.state.lock();
            if state.fail_policy {
                return Err(AuthzError::fetch_failed("injected policy fetch failure"));
            }
            state.rules.clone()
        };

        let mut set = PolicySet::new();
        for (rule_domain, rule) in rules {
            if rule_domain == domain {
                set.add_rule(rule_domain, rule);
            }
        }
        Ok(set)
    }

    async fn fetch_signed_token(
        &self,
        domain: &str,
        role: &str,
        header: &str,
        credential: &str,
    ) -> Result<String, AuthzError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.last_exchange = Some((domain.to_string(), role.to_string(), header.to_string()));
        state
            .exchange_tokens
            .get(credential)
            .cloned()
            .ok_or_else(|| AuthzError::fetch_failed("credential not recognized"))
    }
}

/// A valid [`AuthorityConfig`] for the `sys.auth` test domain.
#[must_use]
pub fn test_authority_config() -> AuthorityConfig {
    AuthorityConfig {
        url: "https://authority.test:4443/v1".to_string(),
        domain: "sys.auth".to_string(),
        pubkey_refresh_secs: 1800,
        policy_refresh_secs: 1800,
        credential_header: DEFAULT_CREDENTIAL_HEADER.to_string(),
        policy: PolicyDefaults { action: "access".to_string(), resource: "vault".to_string() },
    }
}
