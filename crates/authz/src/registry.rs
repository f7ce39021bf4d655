//! Durable role bindings.
//!
//! A role binding names an external role and the lease parameters a
//! successful login against it produces. Bindings are stored as JSON under
//! the `role/` prefix, keyed by lower-cased binding name. Older entries may
//! carry the deprecated `policies`/`ttl_secs`/`max_ttl_secs` fields; those
//! are promoted into their `token_*` replacements on read and on write, so
//! the registry keeps accepting data written before the rename.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use trustgate_storage::StorageBackend;

use crate::{config::is_valid_identifier, error::AuthzError};

const ROLE_PREFIX: &[u8] = b"role/";

/// A stored role binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    /// Binding name (lower-cased registry key).
    pub name: String,
    /// External role the presented token must claim.
    pub role: String,
    /// Action checked against policy; `None` falls back to the configured
    /// default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Resource checked against policy; `None` falls back to the configured
    /// default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Policies attached to the issued lease.
    #[serde(default)]
    pub token_policies: Vec<String>,
    /// Lease TTL in seconds (0 means backend default).
    #[serde(default)]
    pub token_ttl_secs: u64,
    /// Lease max TTL in seconds (0 means backend default).
    #[serde(default)]
    pub token_max_ttl_secs: u64,

    /// Deprecated: use `token_policies`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<String>,
    /// Deprecated: use `token_ttl_secs`.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub ttl_secs: u64,
    /// Deprecated: use `token_max_ttl_secs`.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_ttl_secs: u64,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(v: &u64) -> bool {
    *v == 0
}

impl RoleBinding {
    /// Promotes deprecated fields into their replacements.
    ///
    /// One-directional: a deprecated field only fills its replacement when
    /// the replacement is unset; a set replacement always wins, even when
    /// the stored deprecated value diverges from it. Applying this twice is
    /// a no-op.
    pub fn promote_legacy(&mut self) {
        if self.token_policies.is_empty() && !self.policies.is_empty() {
            self.token_policies = self.policies.clone();
        }
        if self.token_ttl_secs == 0 && self.ttl_secs != 0 {
            self.token_ttl_secs = self.ttl_secs;
        }
        if self.token_max_ttl_secs == 0 && self.max_ttl_secs != 0 {
            self.token_max_ttl_secs = self.max_ttl_secs;
        }
    }
}

/// Partial update for a role binding; `None` preserves the stored value.
#[derive(Debug, Clone, Default)]
pub struct RoleParams {
    /// External role the token must claim.
    pub role: Option<String>,
    /// Action override.
    pub action: Option<String>,
    /// Resource override.
    pub resource: Option<String>,
    /// Lease policies.
    pub token_policies: Option<Vec<String>>,
    /// Lease TTL in seconds.
    pub token_ttl_secs: Option<u64>,
    /// Lease max TTL in seconds.
    pub token_max_ttl_secs: Option<u64>,
    /// Deprecated alias for `token_policies`.
    pub policies: Option<Vec<String>>,
    /// Deprecated alias for `token_ttl_secs`.
    pub ttl_secs: Option<u64>,
    /// Deprecated alias for `token_max_ttl_secs`.
    pub max_ttl_secs: Option<u64>,
}

/// Registry of role bindings over a storage backend.
///
/// Reads are lock-free (storage reads are whole-value atomic); `write` and
/// `delete` serialize behind one registry-wide mutex so a read-modify-write
/// never interleaves with another mutation of any binding.
pub struct RoleRegistry {
    storage: Arc<dyn StorageBackend>,
    write_lock: Mutex<()>,
}

impl RoleRegistry {
    /// Creates a registry over the given backend.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage, write_lock: Mutex::new(()) }
    }

    /// Creates or updates a binding, merging `params` over the stored value.
    ///
    /// The name is lower-cased before use. A request may set a field through
    /// either its current name or its deprecated alias, but not both at
    /// once. Whichever was supplied, both the deprecated and replacement
    /// fields are persisted in sync so older readers keep working.
    ///
    /// # Errors
    ///
    /// - [`AuthzError::MissingName`] — empty name.
    /// - [`AuthzError::InvalidConfig`] — missing or malformed role name, or
    ///   a deprecated field supplied together with its replacement.
    /// - [`AuthzError::Storage`] — backend failure.
    pub async fn write(&self, name: &str, params: RoleParams) -> Result<(), AuthzError> {
        let name = normalized_name(name)?;

        // Aliases conflict only within one request; a stored deprecated
        // value never blocks an update through the current field name.
        if params.token_policies.is_some() && params.policies.is_some() {
            return Err(AuthzError::invalid_config(
                "cannot supply both policies and token_policies",
            ));
        }
        if params.token_ttl_secs.is_some() && params.ttl_secs.is_some() {
            return Err(AuthzError::invalid_config("cannot supply both ttl and token_ttl"));
        }
        if params.token_max_ttl_secs.is_some() && params.max_ttl_secs.is_some() {
            return Err(AuthzError::invalid_config(
                "cannot supply both max_ttl and token_max_ttl",
            ));
        }

        let _guard = self.write_lock.lock().await;

        let mut binding = self.load(&name).await?.unwrap_or_else(|| RoleBinding {
            name: name.clone(),
            ..RoleBinding::default()
        });

        if let Some(role) = params.role {
            binding.role = role;
        }
        if let Some(action) = params.action {
            binding.action = Some(action);
        }
        if let Some(resource) = params.resource {
            binding.resource = Some(resource);
        }
        if let Some(token_policies) = params.token_policies.or(params.policies) {
            binding.token_policies = token_policies;
        }
        if let Some(ttl) = params.token_ttl_secs.or(params.ttl_secs) {
            binding.token_ttl_secs = ttl;
        }
        if let Some(max_ttl) = params.token_max_ttl_secs.or(params.max_ttl_secs) {
            binding.token_max_ttl_secs = max_ttl;
        }

        // Keep the deprecated mirrors in sync with what is persisted.
        binding.policies = binding.token_policies.clone();
        binding.ttl_secs = binding.token_ttl_secs;
        binding.max_ttl_secs = binding.token_max_ttl_secs;

        if binding.role.is_empty() {
            return Err(AuthzError::invalid_config("role is required"));
        }
        if !is_valid_identifier(&binding.role) {
            return Err(AuthzError::invalid_config(format!(
                "invalid role name: {:?}",
                binding.role
            )));
        }

        let value = serde_json::to_vec(&binding)
            .map_err(|e| AuthzError::invalid_config(format!("serialize binding: {e}")))?;
        self.storage.put(storage_key(&name), value).await?;

        tracing::debug!(name = %name, role = %binding.role, "role binding written");
        Ok(())
    }

    /// Looks up a binding by name; `None` when absent.
    ///
    /// Deprecated fields are promoted before returning.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::MissingName`] for an empty name,
    /// [`AuthzError::Storage`] on backend failure, or
    /// [`AuthzError::InvalidConfig`] if the stored entry fails to decode.
    pub async fn resolve(&self, name: &str) -> Result<Option<RoleBinding>, AuthzError> {
        let name = normalized_name(name)?;
        self.load(&name).await
    }

    /// Deletes a binding. Deleting an absent binding succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::MissingName`] for an empty name or
    /// [`AuthzError::Storage`] on backend failure.
    pub async fn delete(&self, name: &str) -> Result<(), AuthzError> {
        let name = normalized_name(name)?;
        let _guard = self.write_lock.lock().await;
        self.storage.delete(&storage_key(&name)).await?;
        tracing::debug!(name = %name, "role binding deleted");
        Ok(())
    }

    /// Lists binding names in key order.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Storage`] on backend failure.
    pub async fn list(&self) -> Result<Vec<String>, AuthzError> {
        let keys = self.storage.list_prefix(ROLE_PREFIX).await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(ROLE_PREFIX)
                    .map(|rest| String::from_utf8_lossy(rest).into_owned())
            })
            .collect())
    }

    async fn load(&self, name: &str) -> Result<Option<RoleBinding>, AuthzError> {
        let Some(raw) = self.storage.get(&storage_key(name)).await? else {
            return Ok(None);
        };
        let mut binding: RoleBinding = serde_json::from_slice(&raw)
            .map_err(|e| AuthzError::invalid_config(format!("decode binding {name:?}: {e}")))?;
        binding.promote_legacy();
        Ok(Some(binding))
    }
}

fn normalized_name(name: &str) -> Result<String, AuthzError> {
    let name = name.trim().to_ascii_lowercase();
    if name.is_empty() {
        return Err(AuthzError::MissingName);
    }
    Ok(name)
}

fn storage_key(name: &str) -> Vec<u8> {
    let mut key = ROLE_PREFIX.to_vec();
    key.extend_from_slice(name.as_bytes());
    key
}
