//! Token verification against a trust snapshot.
//!
//! [`verify`] is a pure function of the raw token, the target role, the
//! (action, resource) pair, and one [`TrustSnapshot`]. It never consults
//! shared state beyond the snapshot it is handed, so one login observes one
//! consistent generation of keys and one of policy throughout.

use chrono::Utc;

use crate::{
    error::AuthzError,
    token::RoleToken,
    trust::TrustSnapshot,
};

/// The claims of a token that passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    /// Trust domain the token was minted for.
    pub domain: String,
    /// Roles the token claims.
    pub roles: Vec<String>,
    /// Principal identity, if present.
    pub principal: Option<String>,
    /// Expiry in Unix seconds.
    pub expiry: i64,
}

/// Verifies a raw role token end to end.
///
/// The checks run in a fixed order and short-circuit on the first failure:
/// syntax, key lookup, signature, expiry, policy, then target-role
/// membership. The distinct error variants exist for logs and tests; a
/// login boundary should collapse them before answering the client (see
/// [`AuthzError::is_verification_failure`]).
///
/// # Errors
///
/// - [`AuthzError::MalformedToken`] — unparseable token.
/// - [`AuthzError::KeyNotFound`] — the snapshot has no key for the
///   token's key id.
/// - [`AuthzError::InvalidSignature`] — signature check failed.
/// - [`AuthzError::TokenExpired`] — expiry at or before now.
/// - [`AuthzError::PolicyDenied`] — no claimed role is granted the action.
/// - [`AuthzError::RoleMismatch`] — the target role is not claimed.
pub fn verify(
    raw_token: &str,
    target_role: &str,
    action: &str,
    resource: &str,
    snapshot: &TrustSnapshot,
) -> Result<VerifiedToken, AuthzError> {
    verify_at(raw_token, target_role, action, resource, snapshot, Utc::now().timestamp())
}

/// [`verify`] with an explicit clock, for deterministic tests.
pub fn verify_at(
    raw_token: &str,
    target_role: &str,
    action: &str,
    resource: &str,
    snapshot: &TrustSnapshot,
    now: i64,
) -> Result<VerifiedToken, AuthzError> {
    let token = RoleToken::parse(raw_token)?;

    let key = snapshot
        .keys
        .get(token.key_id())
        .ok_or_else(|| AuthzError::key_not_found(token.key_id()))?;
    token.verify_signature(key)?;
    token.check_expiry(now)?;

    snapshot.policies.evaluate(token.domain(), token.roles(), action, resource)?;

    if !token.claims_role(target_role) {
        return Err(AuthzError::role_mismatch(target_role));
    }

    Ok(VerifiedToken {
        domain: token.domain().to_string(),
        roles: token.roles().to_vec(),
        principal: token.principal().map(str::to_string),
        expiry: token.expiry(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        testutil::{TestKeyPair, TokenBuilder},
        trust::{PolicyRule, PolicySet, SigningKeySet},
    };

    const NOW: i64 = 1_700_000_000;

    fn snapshot_with(pair: &TestKeyPair, rules: &[(&str, PolicyRule)]) -> TrustSnapshot {
        let mut keys = SigningKeySet::new();
        keys.insert(pair.key_id.clone(), &pair.public_b64).unwrap();

        let mut policies = PolicySet::new();
        for (domain, rule) in rules {
            policies.add_rule(*domain, rule.clone());
        }

        TrustSnapshot { keys: Arc::new(keys), policies: Arc::new(policies) }
    }

    fn valid_token(pair: &TestKeyPair) -> String {
        TokenBuilder::new("sys.auth")
            .roles(&["access_role"])
            .principal("user.svc1")
            .expires_at(NOW + 3600)
            .sign(pair)
    }

    #[test]
    fn test_verify_success() {
        let pair = TestKeyPair::generate("kid-1");
        let snapshot = snapshot_with(
            &pair,
            &[("sys.auth", PolicyRule::allow("access_role", "access", "vault"))],
        );

        let verified =
            verify_at(&valid_token(&pair), "access_role", "access", "vault", &snapshot, NOW)
                .unwrap();

        assert_eq!(verified.domain, "sys.auth");
        assert_eq!(verified.roles, ["access_role"]);
        assert_eq!(verified.principal.as_deref(), Some("user.svc1"));
        assert_eq!(verified.expiry, NOW + 3600);
    }

    #[test]
    fn test_verify_unknown_key_id() {
        let minter = TestKeyPair::generate("kid-1");
        let other = TestKeyPair::generate("kid-2");
        // Snapshot only trusts kid-2; the token was minted with kid-1.
        let snapshot = snapshot_with(
            &other,
            &[("sys.auth", PolicyRule::allow("access_role", "access", "vault"))],
        );

        let err = verify_at(&valid_token(&minter), "access_role", "access", "vault", &snapshot, NOW)
            .unwrap_err();
        assert!(matches!(err, AuthzError::KeyNotFound { ref key_id } if key_id == "kid-1"));
    }

    #[test]
    fn test_verify_expired_token() {
        let pair = TestKeyPair::generate("kid-1");
        let snapshot = snapshot_with(
            &pair,
            &[("sys.auth", PolicyRule::allow("access_role", "access", "vault"))],
        );
        let raw = TokenBuilder::new("sys.auth")
            .roles(&["access_role"])
            .expires_at(NOW - 1)
            .sign(&pair);

        let err = verify_at(&raw, "access_role", "access", "vault", &snapshot, NOW).unwrap_err();
        assert!(matches!(err, AuthzError::TokenExpired));
    }

    #[test]
    fn test_verify_policy_denied() {
        let pair = TestKeyPair::generate("kid-1");
        // Policy grants a different role than the token claims.
        let snapshot = snapshot_with(
            &pair,
            &[("sys.auth", PolicyRule::allow("other_role", "access", "vault"))],
        );

        let err = verify_at(&valid_token(&pair), "access_role", "access", "vault", &snapshot, NOW)
            .unwrap_err();
        assert!(matches!(err, AuthzError::PolicyDenied(_)));
    }

    #[test]
    fn test_verify_target_role_not_claimed() {
        let pair = TestKeyPair::generate("kid-1");
        // Policy passes via the claimed role, but the caller asked for a
        // role the token does not carry.
        let snapshot = snapshot_with(
            &pair,
            &[("sys.auth", PolicyRule::allow("access_role", "access", "vault"))],
        );

        let err = verify_at(&valid_token(&pair), "audit_role", "access", "vault", &snapshot, NOW)
            .unwrap_err();
        assert!(matches!(err, AuthzError::RoleMismatch { ref role } if role == "audit_role"));
    }

    #[test]
    fn test_verify_signature_checked_before_expiry() {
        let minter = TestKeyPair::generate("kid-1");
        let impostor = TestKeyPair::generate("kid-1");
        let snapshot = snapshot_with(
            &impostor,
            &[("sys.auth", PolicyRule::allow("access_role", "access", "vault"))],
        );
        // Expired AND badly signed: signature wins per the fixed order.
        let raw = TokenBuilder::new("sys.auth")
            .roles(&["access_role"])
            .expires_at(NOW - 1)
            .sign(&minter);

        let err = verify_at(&raw, "access_role", "access", "vault", &snapshot, NOW).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidSignature));
    }

    #[test]
    fn test_verify_empty_snapshot_rejects_everything() {
        let pair = TestKeyPair::generate("kid-1");
        let snapshot = TrustSnapshot {
            keys: Arc::new(SigningKeySet::new()),
            policies: Arc::new(PolicySet::new()),
        };

        let err = verify_at(&valid_token(&pair), "access_role", "access", "vault", &snapshot, NOW)
            .unwrap_err();
        assert!(matches!(err, AuthzError::KeyNotFound { .. }));
    }

    #[test]
    fn test_all_failures_classified_as_verification_failures() {
        let pair = TestKeyPair::generate("kid-1");
        let snapshot = snapshot_with(
            &pair,
            &[("sys.auth", PolicyRule::allow("access_role", "access", "vault"))],
        );

        let cases: Vec<AuthzError> = vec![
            verify_at("garbage", "access_role", "access", "vault", &snapshot, NOW).unwrap_err(),
            verify_at(&valid_token(&pair), "other", "access", "vault", &snapshot, NOW).unwrap_err(),
            verify_at(&valid_token(&pair), "access_role", "access", "vault", &snapshot, NOW + 9999)
                .unwrap_err(),
        ];
        for err in cases {
            assert!(err.is_verification_failure(), "{err}");
        }
    }
}
