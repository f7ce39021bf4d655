//! Role token parsing and signature verification.
//!
//! A role token is a semicolon-separated list of `key=value` fields:
//!
//! ```text
//! v=T1;d=sys.auth;r=access_role,audit_role;p=user.svc1;t=1700000000;e=1700003600;k=kid-1;s=<sig>
//! ```
//!
//! `d` (trust domain), `r` (claimed roles), `e` (expiry), `k` (key id) and
//! `s` (signature) are required. The signature is Ed25519 over the exact
//! token text up to, and not including, the `;s=` separator, encoded
//! base64url without padding. Parsing never allocates beyond the field map;
//! verification is a pure function of the token and a verifying key.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::error::AuthzError;

/// Token format version accepted by the parser.
pub const TOKEN_VERSION: &str = "T1";

/// A parsed, not-yet-verified role token.
///
/// Construction via [`RoleToken::parse`] guarantees the required fields are
/// present and well formed; it makes no claim about the signature or
/// expiry. Call [`verify_signature`](Self::verify_signature) and
/// [`check_expiry`](Self::check_expiry) before trusting the claims.
#[derive(Debug, Clone)]
pub struct RoleToken {
    version: String,
    domain: String,
    roles: Vec<String>,
    principal: Option<String>,
    issued_at: Option<i64>,
    expiry: i64,
    key_id: String,
    signature: Vec<u8>,
    /// The exact byte range the signature covers.
    signed_portion: String,
    /// Every field except the signature, in sorted order.
    fields: BTreeMap<String, String>,
}

impl RoleToken {
    /// Parses a raw token string.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::MalformedToken`] when the version is not
    /// recognized, a required field (`d`, `r`, `e`, `k`, `s`) is missing or
    /// empty, a field appears twice, `e`/`t` are not integers, or the
    /// signature fails base64 decoding.
    pub fn parse(raw: &str) -> Result<Self, AuthzError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AuthzError::malformed_token("empty token"));
        }

        let mut version = None;
        let mut domain = None;
        let mut roles = None;
        let mut principal = None;
        let mut issued_at = None;
        let mut expiry = None;
        let mut key_id = None;
        let mut signature_b64 = None;
        let mut signed_end = None;

        let mut fields = BTreeMap::new();
        let mut offset = 0usize;
        for field in raw.split(';') {
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| AuthzError::malformed_token(format!("field without '=': {field:?}")))?;

            if key != "s" && fields.insert(key.to_string(), value.to_string()).is_some() {
                return Err(AuthzError::malformed_token(format!("duplicate field: {key}")));
            }

            let slot: &mut Option<&str> = match key {
                "v" => &mut version,
                "d" => &mut domain,
                "r" => &mut roles,
                "p" => &mut principal,
                "t" => &mut issued_at,
                "e" => &mut expiry,
                "k" => &mut key_id,
                "s" => &mut signature_b64,
                // Unknown fields are kept in the map so the format can grow.
                _ => {
                    offset += field.len() + 1;
                    continue;
                },
            };

            if slot.replace(value).is_some() {
                return Err(AuthzError::malformed_token(format!("duplicate field: {key}")));
            }

            if key == "s" {
                // The signature covers everything before ";s=". The
                // separator before this field is offset-1.
                signed_end = Some(offset.saturating_sub(1));
            }
            offset += field.len() + 1;
        }

        if let Some(v) = version {
            if v != TOKEN_VERSION {
                return Err(AuthzError::malformed_token(format!("unsupported version: {v}")));
            }
        }

        let domain = require("d", domain)?;
        let roles_raw = require("r", roles)?;
        let expiry_raw = require("e", expiry)?;
        let key_id = require("k", key_id)?;
        let signature_b64 = require("s", signature_b64)?;
        let signed_end =
            signed_end.ok_or_else(|| AuthzError::malformed_token("missing required field: s"))?;

        let roles: Vec<String> = roles_raw
            .split(',')
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect();
        if roles.is_empty() {
            return Err(AuthzError::malformed_token("token claims no roles"));
        }

        let expiry: i64 = expiry_raw
            .parse()
            .map_err(|_| AuthzError::malformed_token(format!("invalid expiry: {expiry_raw:?}")))?;

        let issued_at = match issued_at {
            Some(t) => Some(
                t.parse()
                    .map_err(|_| AuthzError::malformed_token(format!("invalid issue time: {t:?}")))?,
            ),
            None => None,
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64.as_bytes())
            .map_err(|e| AuthzError::malformed_token(format!("signature decode: {e}")))?;

        Ok(Self {
            version: version.unwrap_or(TOKEN_VERSION).to_string(),
            domain: domain.to_string(),
            roles,
            principal: principal.map(str::to_string),
            issued_at,
            expiry,
            key_id: key_id.to_string(),
            signature,
            signed_portion: raw[..signed_end].to_string(),
            fields,
        })
    }

    /// Verifies the Ed25519 signature over the signed portion.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::MalformedToken`] if the signature bytes are not
    /// a valid Ed25519 signature, or [`AuthzError::InvalidSignature`] if
    /// verification fails.
    pub fn verify_signature(&self, key: &VerifyingKey) -> Result<(), AuthzError> {
        let signature = Signature::from_slice(&self.signature)
            .map_err(|e| AuthzError::malformed_token(format!("signature length: {e}")))?;

        key.verify(self.signed_portion.as_bytes(), &signature)
            .map_err(|_| AuthzError::InvalidSignature)
    }

    /// Checks the token has not expired as of `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::TokenExpired`] when `expiry <= now`.
    pub fn check_expiry(&self, now: i64) -> Result<(), AuthzError> {
        if self.expiry <= now {
            Err(AuthzError::TokenExpired)
        } else {
            Ok(())
        }
    }

    /// Whether `role` is among the claimed roles (exact match).
    #[must_use]
    pub fn claims_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Token format version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Trust domain the token was minted for.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Claimed roles, in token order.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Principal identity, if the token carries one.
    #[must_use]
    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    /// Issue time in Unix seconds, if the token carries one.
    #[must_use]
    pub fn issued_at(&self) -> Option<i64> {
        self.issued_at
    }

    /// Expiry time in Unix seconds.
    #[must_use]
    pub fn expiry(&self) -> i64 {
        self.expiry
    }

    /// Id of the signing key that minted the token.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Raw token fields (signature excluded), for audit metadata.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

fn require<'a>(name: &str, value: Option<&'a str>) -> Result<&'a str, AuthzError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AuthzError::malformed_token(format!("missing required field: {name}"))),
    }
}
