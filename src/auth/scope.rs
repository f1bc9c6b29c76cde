//! Scope resolution
//!
//! Turns a verified capability into the request-scoped [`Scope`] every
//! storage call takes, together with the granted [`Permissions`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{error, warn};

use super::token::TokenVerifier;
use crate::error::AuthError;
use crate::storage::permissions::Permissions;
use crate::storage::validation::{validate_subject, validate_tenant_or_realm};

/// Claims carried by a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub tenant: String,
    pub realm: String,
    pub subject: String,
    pub mode: String,
    pub expires_at: DateTime<Utc>,
}

/// Root directory and caller identity for one request.
///
/// Only a [`ScopeResolver`] creates scopes, so `root` is always
/// `<baseDir>/<tenant>/<realm>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    root: PathBuf,
    subject: String,
    tenant: String,
}

impl Scope {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }
}

/// A resolved capability: where the caller may act, what it may do and
/// until when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub scope: Scope,
    pub permissions: Permissions,
    pub expires_at: DateTime<Utc>,
}

impl Grant {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Builds scopes beneath a fixed base directory. Performs no I/O.
#[derive(Debug, Clone)]
pub struct ScopeResolver {
    base_dir: PathBuf,
}

impl ScopeResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn resolve(&self, capability: &Capability) -> Result<Grant, AuthError> {
        if let Err(e) = validate_tenant_or_realm(&capability.tenant)
            .and_then(|()| validate_tenant_or_realm(&capability.realm))
        {
            error!("Rejected capability with malformed tenant or realm: {e}");
            return Err(AuthError::AccessDenied(e.to_string()));
        }

        if capability.subject.trim().is_empty() {
            return Err(AuthError::AccessDenied("subject must not be empty".into()));
        }
        validate_subject(&capability.subject).map_err(|e| AuthError::AccessDenied(e.to_string()))?;

        if capability.expires_at <= Utc::now() {
            warn!(
                "Rejected expired capability for {} ({})",
                capability.subject, capability.tenant
            );
            return Err(AuthError::AccessDenied("capability expired".into()));
        }

        let scope = Scope {
            root: self.base_dir.join(&capability.tenant).join(&capability.realm),
            subject: capability.subject.clone(),
            tenant: capability.tenant.clone(),
        };

        Ok(Grant {
            scope,
            permissions: Permissions::from_mode(&capability.mode),
            expires_at: capability.expires_at,
        })
    }

    /// Verifies a bearer token and resolves it. A missing or unverifiable
    /// token is refused.
    pub fn resolve_token(
        &self,
        verifier: &dyn TokenVerifier,
        bearer: Option<&str>,
    ) -> Result<Grant, AuthError> {
        let token = bearer
            .map(str::trim)
            .map(|t| t.strip_prefix("Bearer ").unwrap_or(t))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::AccessDenied("no capability presented".into()))?;

        let capability = verifier
            .verify(token)
            .map_err(|e| AuthError::AccessDenied(e.to_string()))?;

        self.resolve(&capability)
    }
}
