//! Authentication and authorization
//!
//! Tenant credentials, capability tokens and their resolution into a
//! storage [`Scope`].

pub mod credentials;
pub mod scope;
pub mod token;

pub use credentials::{CredentialStore, DEFAULT_TENANT_NAME};
pub use scope::{Capability, Grant, Scope, ScopeResolver};
pub use token::{ExpiryZone, JwtTokenService, TokenRequest, TokenVerifier};
