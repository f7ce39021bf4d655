//! Role-token authentication for a credential broker.
//!
//! This crate keeps a refreshed local copy of a remote authority's signing
//! keys and authorization policy ([`TrustCache`]), verifies presented role
//! tokens against it ([`verifier`]), and maps verified tokens to lease
//! parameters through durable role bindings ([`RoleRegistry`]). The
//! [`AuthBackend`] ties the pieces together behind the two login paths.
//!
//! The transport to the authority is abstracted behind [`AuthorityClient`];
//! this crate never opens a connection itself.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use trustgate_authz::{AuthBackend, Config, RoleParams};
//! use trustgate_storage::MemoryBackend;
//!
//! # async fn example(authority: Arc<dyn trustgate_authz::AuthorityClient>) -> Result<(), trustgate_authz::AuthzError> {
//! let config = Config::load("trustgate.yaml")?;
//! let backend = AuthBackend::new(config, Arc::new(MemoryBackend::new()), authority)?;
//! backend.start().await?;
//!
//! backend
//!     .write_role(
//!         "svc1",
//!         RoleParams { role: Some("access_role".into()), ..RoleParams::default() },
//!     )
//!     .await?;
//!
//! let lease = backend.login("svc1", "v=T1;d=...;s=...").await?;
//! println!("policies: {:?}", lease.policies);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod authority;
mod backend;
mod config;
mod error;
mod registry;
mod token;
mod trust;
mod verifier;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use authority::AuthorityClient;
pub use backend::{AuthBackend, Lease};
pub use config::{
    is_valid_identifier, AuthorityConfig, Config, PolicyDefaults, DEFAULT_CREDENTIAL_HEADER,
    DEFAULT_REFRESH_SECS,
};
pub use error::{AuthzError, Result};
pub use registry::{RoleBinding, RoleParams, RoleRegistry};
pub use token::{RoleToken, TOKEN_VERSION};
pub use trust::{Effect, PolicyRule, PolicySet, SigningKeySet, TrustCache, TrustSnapshot};
pub use verifier::{verify, verify_at, VerifiedToken};
