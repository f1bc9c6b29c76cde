//! Module `state`
//!
//! Per-connection session state: the peer address and, once `AUTH`
//! succeeded, the grant resolved from the presented capability.

use std::net::SocketAddr;

use crate::auth::{Grant, Scope};
use crate::error::AuthError;
use crate::storage::Permission;

/// State of one connected client.
#[derive(Debug)]
pub struct Session {
    addr: SocketAddr,
    grant: Option<Grant>,
}

impl Session {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, grant: None }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Replaces any earlier grant of this connection.
    pub fn authenticate(&mut self, grant: Grant) {
        self.grant = Some(grant);
    }

    pub fn is_authenticated(&self) -> bool {
        self.grant.is_some()
    }

    /// Subject of the current grant, for logging.
    pub fn subject(&self) -> Option<&str> {
        self.grant.as_ref().map(|g| g.scope.subject())
    }

    /// Returns the scope if the current grant is live and includes `permission`.
    ///
    /// An expired grant is dropped, so the client has to authenticate again.
    pub fn authorize(&mut self, permission: Permission) -> Result<&Scope, AuthError> {
        if self.grant.as_ref().is_some_and(Grant::is_expired) {
            self.grant = None;
            return Err(AuthError::AccessDenied("capability expired".into()));
        }

        let grant = self
            .grant
            .as_ref()
            .ok_or_else(|| AuthError::AccessDenied("not authenticated".into()))?;

        if !grant.permissions.allows(permission) {
            return Err(AuthError::AccessDenied(format!(
                "capability does not grant {permission:?}"
            )));
        }

        Ok(&grant.scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ScopeResolver;
    use crate::auth::scope::tests::capability;
    use chrono::{Duration, Utc};

    fn session_with(mode: &str) -> Session {
        let grant = ScopeResolver::new("/depot")
            .resolve(&capability("acme", "exam", mode))
            .unwrap();
        let mut session = Session::new("127.0.0.1:4000".parse().unwrap());
        session.authenticate(grant);
        session
    }

    #[test]
    fn unauthenticated_session_is_denied() {
        let mut session = Session::new("127.0.0.1:4000".parse().unwrap());
        assert!(session.authorize(Permission::Read).is_err());
    }

    #[test]
    fn permissions_are_enforced() {
        let mut session = session_with("r");
        assert!(session.authorize(Permission::Read).is_ok());
        assert!(session.authorize(Permission::Write).is_err());
        assert!(session.authorize(Permission::Delete).is_err());
        assert_eq!(session.subject(), Some("subject"));
    }

    #[test]
    fn expired_grant_is_dropped() {
        let mut session = session_with("rwd");
        if let Some(grant) = session.grant.as_mut() {
            grant.expires_at = Utc::now() - Duration::seconds(1);
        }
        assert!(session.authorize(Permission::Read).is_err());
        assert!(!session.is_authenticated());
    }
}
