//! Trust policy cache: signing keys and authorization policy.
//!
//! [`TrustCache`] keeps a locally usable copy of the remote authority's
//! signing keys and authorization policy, refreshed by two independent
//! background loops. Readers are never blocked by a refresh: each published
//! set is immutable, and a refresh swaps in a complete replacement only
//! after its fetch has fully succeeded (copy-and-swap, never in-place
//! mutation). A failed fetch logs and retains the prior set — serving
//! slightly stale trust data is preferable to serving a half-updated set.
//!
//! # Snapshot consistency
//!
//! [`TrustCache::snapshot`] clones the current key-set and policy-set
//! handles independently, without a joint lock. Each set is always one
//! complete generation, but the two generations may drift relative to each
//! other since the loops run on independent cadences. This staleness window
//! is accepted by design; forcing a joint version stamp would couple the two
//! refresh cadences.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{VerifyingKey, PUBLIC_KEY_LENGTH};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    authority::AuthorityClient,
    config::AuthorityConfig,
    error::AuthzError,
};

/// An immutable generation of signing keys, keyed by key id.
///
/// Built wholesale from one authority fetch; never partially mutated after
/// publication. The generation number is assigned by the cache when the set
/// is swapped in.
#[derive(Debug, Clone, Default)]
pub struct SigningKeySet {
    generation: u64,
    keys: HashMap<String, VerifyingKey>,
}

impl SigningKeySet {
    /// Creates an empty key set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key from base64url-encoded (no padding) Ed25519 public key
    /// material.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::FetchFailed`] if the material does not decode
    /// to a valid 32-byte Ed25519 public key. A set containing any unusable
    /// key is rejected at construction rather than half-applied.
    pub fn insert(&mut self, key_id: impl Into<String>, material_b64: &str) -> Result<(), AuthzError> {
        let key_id = key_id.into();
        let bytes = URL_SAFE_NO_PAD
            .decode(material_b64.as_bytes())
            .map_err(|e| AuthzError::fetch_failed(format!("key {key_id}: base64 decode: {e}")))?;

        let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
            AuthzError::fetch_failed(format!(
                "key {key_id}: expected {PUBLIC_KEY_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;

        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| AuthzError::fetch_failed(format!("key {key_id}: invalid Ed25519 key: {e}")))?;

        self.keys.insert(key_id, key);
        Ok(())
    }

    /// Looks up a verifying key by key id.
    #[must_use]
    pub fn get(&self, key_id: &str) -> Option<&VerifyingKey> {
        self.keys.get(key_id)
    }

    /// Number of keys in this generation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether this generation holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Generation number assigned at publication (0 before first publish).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }
}

/// Whether a policy rule grants or denies the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// The role may perform the action on the resource.
    Allow,
    /// The role must not perform the action; overrides any allow.
    Deny,
}

/// One authorization assertion: a role's permission on (action, resource).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Role the assertion applies to.
    pub role: String,
    /// Action being granted or denied.
    pub action: String,
    /// Resource the action applies to.
    pub resource: String,
    /// Allow or deny.
    pub effect: Effect,
}

impl PolicyRule {
    /// Creates an allow rule.
    #[must_use]
    pub fn allow(role: impl Into<String>, action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self { role: role.into(), action: action.into(), resource: resource.into(), effect: Effect::Allow }
    }

    /// Creates a deny rule.
    #[must_use]
    pub fn deny(role: impl Into<String>, action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self { role: role.into(), action: action.into(), resource: resource.into(), effect: Effect::Deny }
    }

    fn matches(&self, role: &str, action: &str, resource: &str) -> bool {
        self.role == role
            && self.action.eq_ignore_ascii_case(action)
            && self.resource.eq_ignore_ascii_case(resource)
    }
}

/// An immutable generation of authorization policy, grouped by trust domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySet {
    #[serde(skip)]
    generation: u64,
    rules: HashMap<String, Vec<PolicyRule>>,
}

impl PolicySet {
    /// Creates an empty policy set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule under the given trust domain.
    pub fn add_rule(&mut self, domain: impl Into<String>, rule: PolicyRule) {
        self.rules.entry(domain.into()).or_default().push(rule);
    }

    /// Evaluates whether any of `roles` is granted `action` on `resource`
    /// within `domain`.
    ///
    /// Deny overrides allow: a matching deny rule rejects immediately even
    /// if another rule allows. A domain with no rules grants nothing.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::PolicyDenied`] when no claimed role is granted
    /// the action, or when a deny rule matches.
    pub fn evaluate(
        &self,
        domain: &str,
        roles: &[String],
        action: &str,
        resource: &str,
    ) -> Result<(), AuthzError> {
        let rules = self.rules.get(domain).map(Vec::as_slice).unwrap_or_default();

        let mut allowed = false;
        for rule in rules {
            for role in roles {
                if rule.matches(role, action, resource) {
                    match rule.effect {
                        Effect::Deny => {
                            return Err(AuthzError::policy_denied(format!(
                                "role {role} explicitly denied {action} on {domain}:{resource}"
                            )));
                        },
                        Effect::Allow => allowed = true,
                    }
                }
            }
        }

        if allowed {
            Ok(())
        } else {
            Err(AuthzError::policy_denied(format!(
                "no claimed role is granted {action} on {domain}:{resource}"
            )))
        }
    }

    /// Total number of rules across all domains.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    /// Whether the set holds no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.values().all(Vec::is_empty)
    }

    /// Generation number assigned at publication (0 before first publish).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }
}

/// A point-in-time pairing of key-set and policy-set handles.
///
/// One verification call uses one snapshot throughout. The two generations
/// are taken independently and may drift (see module docs).
#[derive(Clone)]
pub struct TrustSnapshot {
    /// Current signing keys.
    pub keys: Arc<SigningKeySet>,
    /// Current authorization policy.
    pub policies: Arc<PolicySet>,
}

/// Which of the two refresh loops a task drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshKind {
    Keys,
    Policy,
}

impl RefreshKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Keys => "pubkey",
            Self::Policy => "policy",
        }
    }
}

/// Periodically refreshed holder of the authority's trust data.
///
/// Created via [`TrustCache::new`] (which validates the configuration),
/// optionally primed with one synchronous fetch via [`prime`](Self::prime),
/// then started with [`start`](Self::start). [`snapshot`](Self::snapshot)
/// is non-blocking and safe to call from any number of concurrent
/// verification requests.
pub struct TrustCache {
    authority: Arc<dyn AuthorityClient>,
    config: AuthorityConfig,
    keys: RwLock<Arc<SigningKeySet>>,
    policies: RwLock<Arc<PolicySet>>,
    /// Monotonic generation counters, bumped on every successful publish.
    key_gen: AtomicU64,
    policy_gen: AtomicU64,
    /// Shared cancellation signal for both refresh loops.
    cancel_token: CancellationToken,
    /// Handles for the two refresh loops, if running.
    /// Wrapped in `Mutex` so `shutdown()` can take ownership via `&self`.
    handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    /// Completed refresh cycles across both loops.
    refresh_cycles: AtomicU64,
    /// Failed refresh attempts across both loops.
    refresh_failures: AtomicU64,
}

impl TrustCache {
    /// Creates a new trust cache.
    ///
    /// The configuration is validated here; both sets start empty and
    /// reject all tokens until the first successful refresh.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidConfig`] if the authority URL fails to
    /// parse or the trust domain fails the identifier grammar.
    pub fn new(
        config: AuthorityConfig,
        authority: Arc<dyn AuthorityClient>,
    ) -> Result<Arc<Self>, AuthzError> {
        config.validate()?;

        Ok(Arc::new(Self {
            authority,
            config,
            keys: RwLock::new(Arc::new(SigningKeySet::new())),
            policies: RwLock::new(Arc::new(PolicySet::new())),
            key_gen: AtomicU64::new(0),
            policy_gen: AtomicU64::new(0),
            cancel_token: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
            refresh_cycles: AtomicU64::new(0),
            refresh_failures: AtomicU64::new(0),
        }))
    }

    /// Performs one synchronous fetch of both sets.
    ///
    /// Useful at startup when the caller wants a ready cache (or a fail-fast
    /// error) before serving logins. The background loops also fetch on
    /// their first tick, so priming is optional.
    ///
    /// # Errors
    ///
    /// Returns the first [`AuthzError::FetchFailed`] encountered.
    pub async fn prime(&self) -> Result<(), AuthzError> {
        self.refresh(RefreshKind::Keys).await?;
        self.refresh(RefreshKind::Policy).await?;
        Ok(())
    }

    /// Launches the two refresh loops.
    ///
    /// Each loop fetches immediately, then on its configured interval. A
    /// failed fetch is logged and retried on the next tick; the prior set
    /// keeps serving. The loops stop when [`shutdown`](Self::shutdown) is
    /// called or the [cancellation token](Self::cancel_token) fires.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    pub fn start(self: &Arc<Self>) {
        let mut handles = self.handles.lock();
        handles.push(self.spawn_refresh_loop(RefreshKind::Keys, self.config.pubkey_refresh()));
        handles.push(self.spawn_refresh_loop(RefreshKind::Policy, self.config.policy_refresh()));
    }

    fn spawn_refresh_loop(
        self: &Arc<Self>,
        kind: RefreshKind,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        let token = self.cancel_token.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                // Cancellation is checked at the loop boundary only; an
                // in-flight fetch completes and its result is discarded
                // at publish time.
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!(refresh = kind.as_str(), "refresh loop shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        match cache.refresh(kind).await {
                            Ok(()) => {
                                cache.refresh_cycles.fetch_add(1, Ordering::Relaxed);
                            },
                            Err(err) => {
                                cache.refresh_failures.fetch_add(1, Ordering::Relaxed);
                                tracing::warn!(
                                    refresh = kind.as_str(),
                                    error = %err,
                                    "refresh failed, retaining previous set"
                                );
                            },
                        }
                    }
                }
            }
        })
    }

    /// Fetches and publishes one set. The swap happens only after the fetch
    /// fully completed; a fetch finishing after cancellation is discarded.
    async fn refresh(&self, kind: RefreshKind) -> Result<(), AuthzError> {
        match kind {
            RefreshKind::Keys => {
                let mut set = self.authority.fetch_public_keys().await?;
                if self.cancel_token.is_cancelled() {
                    tracing::debug!(refresh = kind.as_str(), "discarding fetch after cancellation");
                    return Ok(());
                }
                let generation = self.key_gen.fetch_add(1, Ordering::AcqRel) + 1;
                set.set_generation(generation);
                let count = set.len();
                *self.keys.write() = Arc::new(set);
                tracing::debug!(generation, keys = count, "published signing key set");
            },
            RefreshKind::Policy => {
                let mut set = self.authority.fetch_policy(&self.config.domain).await?;
                if self.cancel_token.is_cancelled() {
                    tracing::debug!(refresh = kind.as_str(), "discarding fetch after cancellation");
                    return Ok(());
                }
                let generation = self.policy_gen.fetch_add(1, Ordering::AcqRel) + 1;
                set.set_generation(generation);
                let count = set.len();
                *self.policies.write() = Arc::new(set);
                tracing::debug!(generation, rules = count, "published policy set");
            },
        }
        Ok(())
    }

    /// Returns the current trust snapshot.
    ///
    /// Non-blocking: two brief read-locked clones of `Arc` handles. Returns
    /// instantly even while a refresh is in flight, because a refresh
    /// publishes a new immutable value only after its fetch completed.
    #[must_use]
    pub fn snapshot(&self) -> TrustSnapshot {
        TrustSnapshot {
            keys: Arc::clone(&self.keys.read()),
            policies: Arc::clone(&self.policies.read()),
        }
    }

    /// The trust domain this cache serves.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.config.domain
    }

    /// Returns the cancellation token shared by both refresh loops.
    ///
    /// Callers can use this to integrate with external shutdown signals.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Stops both refresh loops and waits for them to finish.
    ///
    /// No further swaps occur after shutdown; already-cached values remain
    /// servable through [`snapshot`](Self::snapshot).
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        // Take the handles so we can await them without holding the lock.
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "refresh loop task panicked");
            }
        }
    }

    /// Number of completed refresh cycles across both loops.
    #[must_use]
    pub fn refresh_cycles(&self) -> u64 {
        self.refresh_cycles.load(Ordering::Relaxed)
    }

    /// Number of failed refresh attempts across both loops.
    #[must_use]
    pub fn refresh_failures(&self) -> u64 {
        self.refresh_failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::testutil::{test_authority_config, StaticAuthority, TestKeyPair};

    #[test]
    fn test_signing_key_set_insert_and_get() {
        let pair = TestKeyPair::generate("kid-1");
        let mut set = SigningKeySet::new();
        set.insert("kid-1", &pair.public_b64).unwrap();

        assert_eq!(set.len(), 1);
        assert!(set.get("kid-1").is_some());
        assert!(set.get("kid-2").is_none());
    }

    #[test]
    fn test_signing_key_set_rejects_bad_material() {
        let mut set = SigningKeySet::new();

        let err = set.insert("bad", "not-valid-base64!!!").unwrap_err();
        assert!(matches!(err, AuthzError::FetchFailed(_)));

        let err = set.insert("short", "AAAA").unwrap_err();
        assert!(matches!(err, AuthzError::FetchFailed(_)));

        // The set is unchanged by failed inserts.
        assert!(set.is_empty());
    }

    #[test]
    fn test_policy_evaluate_allow() {
        let mut set = PolicySet::new();
        set.add_rule("sys.auth", PolicyRule::allow("access_role", "access", "vault"));

        let roles = vec!["access_role".to_string()];
        assert!(set.evaluate("sys.auth", &roles, "access", "vault").is_ok());
    }

    #[test]
    fn test_policy_evaluate_no_matching_role() {
        let mut set = PolicySet::new();
        set.add_rule("sys.auth", PolicyRule::allow("access_role", "access", "vault"));

        let roles = vec!["other_role".to_string()];
        let result = set.evaluate("sys.auth", &roles, "access", "vault");
        assert!(matches!(result, Err(AuthzError::PolicyDenied(_))));
    }

    #[test]
    fn test_policy_evaluate_deny_overrides_allow() {
        let mut set = PolicySet::new();
        set.add_rule("sys.auth", PolicyRule::allow("access_role", "access", "vault"));
        set.add_rule("sys.auth", PolicyRule::deny("access_role", "access", "vault"));

        let roles = vec!["access_role".to_string()];
        let result = set.evaluate("sys.auth", &roles, "access", "vault");
        assert!(
            matches!(result, Err(AuthzError::PolicyDenied(ref msg)) if msg.contains("denied"))
        );
    }

    #[test]
    fn test_policy_evaluate_unknown_domain_grants_nothing() {
        let set = PolicySet::new();
        let roles = vec!["access_role".to_string()];
        let result = set.evaluate("unknown.domain", &roles, "access", "vault");
        assert!(matches!(result, Err(AuthzError::PolicyDenied(_))));
    }

    #[test]
    fn test_policy_action_match_is_case_insensitive() {
        let mut set = PolicySet::new();
        set.add_rule("sys.auth", PolicyRule::allow("access_role", "ACCESS", "Vault"));

        let roles = vec!["access_role".to_string()];
        assert!(set.evaluate("sys.auth", &roles, "access", "vault").is_ok());
    }

    #[tokio::test]
    async fn test_prime_publishes_both_sets() {
        let pair = TestKeyPair::generate("kid-1");
        let authority = Arc::new(StaticAuthority::new());
        authority.set_keys(&[&pair]);
        authority.allow("sys.auth", "access_role", "access", "vault");

        let cache = TrustCache::new(test_authority_config(), authority).unwrap();
        cache.prime().await.unwrap();

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.keys.generation(), 1);
        assert_eq!(snapshot.policies.generation(), 1);
        assert!(snapshot.keys.get("kid-1").is_some());
    }

    #[tokio::test]
    async fn test_snapshot_before_first_refresh_is_empty() {
        let authority = Arc::new(StaticAuthority::new());
        let cache = TrustCache::new(test_authority_config(), authority).unwrap();

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.keys.generation(), 0);
        assert!(snapshot.keys.is_empty());
        assert!(snapshot.policies.is_empty());
    }

    #[tokio::test]
    async fn test_failed_refresh_retains_previous_set() {
        let pair = TestKeyPair::generate("kid-1");
        let authority = Arc::new(StaticAuthority::new());
        authority.set_keys(&[&pair]);
        authority.allow("sys.auth", "access_role", "access", "vault");

        let cache = TrustCache::new(test_authority_config(), Arc::clone(&authority) as _).unwrap();
        cache.prime().await.unwrap();

        // Authority goes down; a refresh attempt fails but the published
        // generation keeps serving.
        authority.fail_key_fetches(true);
        let err = cache.refresh(RefreshKind::Keys).await.unwrap_err();
        assert!(matches!(err, AuthzError::FetchFailed(_)));

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.keys.generation(), 1);
        assert!(snapshot.keys.get("kid-1").is_some());
    }

    #[tokio::test]
    async fn test_failed_policy_refresh_retains_previous_set() {
        let pair = TestKeyPair::generate("kid-1");
        let authority = Arc::new(StaticAuthority::new());
        authority.set_keys(&[&pair]);
        authority.allow("sys.auth", "access_role", "access", "vault");

        let cache = TrustCache::new(test_authority_config(), Arc::clone(&authority) as _).unwrap();
        cache.prime().await.unwrap();

        authority.fail_policy_fetches(true);
        let err = cache.refresh(RefreshKind::Policy).await.unwrap_err();
        assert!(matches!(err, AuthzError::FetchFailed(_)));

        // The prior policy generation keeps answering.
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.policies.generation(), 1);
        let roles = vec!["access_role".to_string()];
        assert!(snapshot.policies.evaluate("sys.auth", &roles, "access", "vault").is_ok());
    }

    #[tokio::test]
    async fn test_fetch_completing_after_cancellation_is_discarded() {
        let pair = TestKeyPair::generate("kid-1");
        let authority = Arc::new(StaticAuthority::new());
        authority.set_keys(&[&pair]);
        authority.set_fetch_delay(Duration::from_millis(200));

        let cache = TrustCache::new(test_authority_config(), authority).unwrap();

        let refresher = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.refresh(RefreshKind::Keys).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.cancel_token().cancel();

        // The in-flight fetch runs to completion without erroring, but its
        // result is never published.
        refresher.await.unwrap().unwrap();
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.keys.generation(), 0);
        assert!(snapshot.keys.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_replaces_wholesale() {
        let pair_a = TestKeyPair::generate("kid-a");
        let pair_b = TestKeyPair::generate("kid-b");
        let authority = Arc::new(StaticAuthority::new());
        authority.set_keys(&[&pair_a]);

        let cache = TrustCache::new(test_authority_config(), Arc::clone(&authority) as _).unwrap();
        cache.refresh(RefreshKind::Keys).await.unwrap();

        let before = cache.snapshot();
        assert!(before.keys.get("kid-a").is_some());

        // Rotate: the new generation holds only kid-b, never a mix.
        authority.set_keys(&[&pair_b]);
        cache.refresh(RefreshKind::Keys).await.unwrap();

        let after = cache.snapshot();
        assert_eq!(after.keys.generation(), 2);
        assert!(after.keys.get("kid-a").is_none());
        assert!(after.keys.get("kid-b").is_some());

        // The earlier snapshot still sees its own complete generation.
        assert_eq!(before.keys.generation(), 1);
        assert!(before.keys.get("kid-a").is_some());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let pair = TestKeyPair::generate("kid-1");
        let authority = Arc::new(StaticAuthority::new());
        authority.set_keys(&[&pair]);
        authority.allow("sys.auth", "access_role", "access", "vault");

        let mut config = test_authority_config();
        config.pubkey_refresh_secs = 1;
        config.policy_refresh_secs = 1;

        let cache = TrustCache::new(config, authority).unwrap();
        cache.start();

        // The first tick fires immediately; wait for both loops to publish.
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let snapshot = cache.snapshot();
                if snapshot.keys.generation() >= 1 && snapshot.policies.generation() >= 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("loops should publish after start");

        cache.shutdown().await;

        // No further swaps after shutdown.
        let generation = cache.snapshot().keys.generation();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.snapshot().keys.generation(), generation);
    }

    #[tokio::test]
    async fn test_snapshot_does_not_block_during_slow_refresh() {
        let pair = TestKeyPair::generate("kid-1");
        let authority = Arc::new(StaticAuthority::new());
        authority.set_keys(&[&pair]);
        authority.allow("sys.auth", "access_role", "access", "vault");
        authority.set_fetch_delay(Duration::from_millis(200));

        let cache = TrustCache::new(test_authority_config(), authority).unwrap();

        // Kick off a slow refresh and take snapshots while it runs.
        let refresher = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.refresh(RefreshKind::Keys).await })
        };

        let started = std::time::Instant::now();
        let _ = cache.snapshot();
        assert!(
            started.elapsed() < Duration::from_millis(100),
            "snapshot must not wait on an in-flight refresh"
        );

        refresher.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_at_construction() {
        let authority = Arc::new(StaticAuthority::new());
        let mut config = test_authority_config();
        config.domain = "not a domain".to_string();

        let result = TrustCache::new(config, authority);
        assert!(matches!(result, Err(AuthzError::InvalidConfig(_))));
    }
}
