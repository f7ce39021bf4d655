//! Configuration loading and validation.
//!
//! The broker is configured from a YAML file naming the identity authority,
//! the trust domain, refresh cadences for the two trust-cache loops, and the
//! default authorization policy applied to role bindings that do not carry
//! their own.
//!
//! ```yaml
//! authority:
//!   url: https://authority.example.com:4443/zts/v1
//!   domain: sys.auth
//!   pubkey_refresh_secs: 1800
//!   policy_refresh_secs: 1800
//!   credential_header: Authority-Principal-Auth
//!   policy:
//!     action: access
//!     resource: vault
//! ```

use std::{path::Path, sync::LazyLock, time::Duration};

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthzError;

/// Default refresh interval for both signing keys and policy (30 minutes).
pub const DEFAULT_REFRESH_SECS: u64 = 1_800;

/// Default header under which a caller credential is presented to the
/// authority when exchanging it for a role token.
pub const DEFAULT_CREDENTIAL_HEADER: &str = "Authority-Principal-Auth";

/// Trust-domain identifier grammar: letter/digit/underscore/hyphen segments
/// separated by dots. A segment must not start with a hyphen.
static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_][A-Za-z0-9_-]*\.)*[A-Za-z0-9_][A-Za-z0-9_-]*$")
        .expect("domain regex is valid")
});

/// Top-level configuration file structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Identity-authority section.
    pub authority: AuthorityConfig,
}

impl Config {
    /// Loads and validates configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidConfig`] if the file cannot be read,
    /// parsed, or fails [`AuthorityConfig::validate`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AuthzError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AuthzError::invalid_config(format!(
                "cannot read config file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_yaml(&raw)
    }

    /// Parses and validates configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidConfig`] on parse or validation failure.
    pub fn from_yaml(raw: &str) -> Result<Self, AuthzError> {
        let config: Self = serde_yaml::from_str(raw)
            .map_err(|e| AuthzError::invalid_config(format!("cannot parse config: {e}")))?;
        config.authority.validate()?;
        Ok(config)
    }
}

/// Identity-authority configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// Base URL of the identity authority.
    pub url: String,
    /// Trust domain under which roles and policies are defined.
    pub domain: String,
    /// Signing-key refresh interval in seconds.
    #[serde(default = "default_refresh_secs")]
    pub pubkey_refresh_secs: u64,
    /// Policy refresh interval in seconds.
    #[serde(default = "default_refresh_secs")]
    pub policy_refresh_secs: u64,
    /// Header name used when presenting a caller credential to the authority.
    #[serde(default = "default_credential_header")]
    pub credential_header: String,
    /// Default authorization policy for role bindings without their own.
    #[serde(default)]
    pub policy: PolicyDefaults,
}

/// Default action/resource evaluated during token verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDefaults {
    /// Action the verified token must be granted.
    #[serde(default = "default_action")]
    pub action: String,
    /// Resource the action applies to.
    #[serde(default = "default_resource")]
    pub resource: String,
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self { action: default_action(), resource: default_resource() }
    }
}

fn default_refresh_secs() -> u64 {
    DEFAULT_REFRESH_SECS
}

fn default_credential_header() -> String {
    DEFAULT_CREDENTIAL_HEADER.to_string()
}

fn default_action() -> String {
    "access".to_string()
}

fn default_resource() -> String {
    "vault".to_string()
}

impl AuthorityConfig {
    /// Validates the configuration.
    ///
    /// Checks that the authority URL parses, the trust domain is non-empty
    /// and matches the identifier grammar, and the refresh intervals are
    /// non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), AuthzError> {
        Url::parse(&self.url)
            .map_err(|e| AuthzError::invalid_config(format!("authority url: {e}")))?;

        if self.domain.is_empty() {
            return Err(AuthzError::invalid_config("trust domain must be set"));
        }
        if !DOMAIN_RE.is_match(&self.domain) {
            return Err(AuthzError::invalid_config(format!(
                "invalid trust domain: {}",
                self.domain
            )));
        }

        if self.pubkey_refresh_secs == 0 {
            return Err(AuthzError::invalid_config("pubkey_refresh_secs must be non-zero"));
        }
        if self.policy_refresh_secs == 0 {
            return Err(AuthzError::invalid_config("policy_refresh_secs must be non-zero"));
        }

        Ok(())
    }

    /// Signing-key refresh interval.
    #[must_use]
    pub fn pubkey_refresh(&self) -> Duration {
        Duration::from_secs(self.pubkey_refresh_secs)
    }

    /// Policy refresh interval.
    #[must_use]
    pub fn policy_refresh(&self) -> Duration {
        Duration::from_secs(self.policy_refresh_secs)
    }
}

/// Checks a role or domain identifier against the shared grammar.
///
/// Used by the registry to reject role names the authority could never
/// issue tokens for.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    DOMAIN_RE.is_match(name)
}
