//! Capability tokens
//!
//! HS256 JWTs carrying tenant, realm, subject, mode and expiry. Issuing a
//! token requires the tenant's admin password.

use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{error, info};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::credentials::CredentialStore;
use super::scope::Capability;
use crate::audit::{AuditSink, EventType};
use crate::error::AuthError;
use crate::storage::permissions::Permissions;
use crate::storage::validation::{validate_subject, validate_tenant_or_realm};

pub const TOKEN_ISSUER: &str = "depot";

/// Upper bound for tenant, realm, subject and password lengths in requests.
pub const MAX_FIELD_LENGTH: usize = 64;

const SECRET_FILE_NAME: &str = ".jwtsecret";
const GENERATED_SECRET_BYTES: usize = 256;

/// Verifies bearer tokens. The storage core only ever sees this trait.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Capability, AuthError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    sub: String,
    exp: i64,
    tenant: String,
    realm: String,
    mode: String,
}

/// Time zone in which an expiry date starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryZone {
    Utc,
    /// The zone of the host system.
    Local,
    Fixed(FixedOffset),
}

impl ExpiryZone {
    /// Current date in this zone.
    pub fn today(&self) -> NaiveDate {
        match self {
            ExpiryZone::Utc => Utc::now().date_naive(),
            ExpiryZone::Local => Local::now().date_naive(),
            ExpiryZone::Fixed(offset) => Utc::now().with_timezone(offset).date_naive(),
        }
    }

    /// Midnight at the start of `date`. None when a DST gap skips midnight.
    pub fn start_of_day(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let midnight = date.and_time(NaiveTime::MIN);
        match self {
            ExpiryZone::Utc => Some(midnight.and_utc()),
            ExpiryZone::Local => Local
                .from_local_datetime(&midnight)
                .earliest()
                .map(|t| t.with_timezone(&Utc)),
            ExpiryZone::Fixed(offset) => offset
                .from_local_datetime(&midnight)
                .single()
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

impl FromStr for ExpiryZone {
    type Err = String;

    /// Accepts an empty string or `local`, `UTC`, or an offset like `+02:00`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Ok(ExpiryZone::Local),
            zone if zone.eq_ignore_ascii_case("local") => Ok(ExpiryZone::Local),
            zone if zone.eq_ignore_ascii_case("utc") || zone == "Z" => Ok(ExpiryZone::Utc),
            zone => FixedOffset::from_str(zone)
                .map(ExpiryZone::Fixed)
                .map_err(|e| format!("invalid time zone {zone:?}: {e}")),
        }
    }
}

/// Parameters of a token request.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub tenant: String,
    pub password: String,
    pub realm: String,
    pub subject: String,
    pub mode: String,
    pub expiration_date: NaiveDate,
}

impl TokenRequest {
    fn validate(&self, zone: &ExpiryZone) -> Result<(), AuthError> {
        let invalid = |msg: String| Err(AuthError::InvalidRequest(msg));

        for (field, value) in [
            ("tenant", &self.tenant),
            ("password", &self.password),
            ("realm", &self.realm),
            ("subject", &self.subject),
        ] {
            if value.trim().is_empty() {
                return invalid(format!("{field} must not be blank"));
            }
            if value.chars().count() > MAX_FIELD_LENGTH {
                return invalid(format!("{field} exceeds {MAX_FIELD_LENGTH} characters"));
            }
        }

        validate_tenant_or_realm(&self.tenant)
            .and_then(|()| validate_tenant_or_realm(&self.realm))
            .and_then(|()| validate_subject(&self.subject))
            .map_err(|e| AuthError::InvalidRequest(e.to_string()))?;

        let mode = self.mode.to_ascii_lowercase();
        let mut seen = Vec::with_capacity(3);
        for c in mode.chars() {
            if !matches!(c, 'r' | 'w' | 'd') || seen.contains(&c) {
                return invalid(format!("mode {:?} must be a combination of r, w, d", self.mode));
            }
            seen.push(c);
        }
        if seen.is_empty() {
            return invalid("mode must not be empty".into());
        }

        if self.expiration_date <= zone.today() {
            return invalid("expiration date must be in the future".into());
        }

        Ok(())
    }

    fn expires_at(&self, zone: &ExpiryZone) -> Result<DateTime<Utc>, AuthError> {
        zone.start_of_day(self.expiration_date).ok_or_else(|| {
            AuthError::InvalidRequest(format!(
                "expiration date {} has no midnight in the configured time zone",
                self.expiration_date
            ))
        })
    }
}

/// Issues and verifies capability tokens.
pub struct JwtTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    credentials: CredentialStore,
    audit: Arc<dyn AuditSink>,
    zone: ExpiryZone,
}

impl JwtTokenService {
    pub fn new(secret: &[u8], credentials: CredentialStore, audit: Arc<dyn AuditSink>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            credentials,
            audit,
            zone: ExpiryZone::Utc,
        }
    }

    /// Sets the zone in which expiry dates start. Defaults to UTC.
    pub fn with_time_zone(mut self, zone: ExpiryZone) -> Self {
        self.zone = zone;
        self
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Checks the tenant password and signs a token for the request.
    pub fn issue(&self, request: &TokenRequest) -> Result<String, AuthError> {
        if !self.credentials.verify(&request.tenant, &request.password) {
            error!("Token request with invalid credentials for tenant {}", request.tenant);
            return Err(AuthError::AccessDenied("Invalid credentials".into()));
        }

        request.validate(&self.zone)?;
        let expires_at = request.expires_at(&self.zone)?;

        let mode = Permissions::from_mode(&request.mode).to_string();
        info!(
            "Token requested with tenant={} realm={} subject={} mode={} expirationDate={}",
            request.tenant, request.realm, request.subject, mode, request.expiration_date
        );
        self.audit.log(
            &request.tenant,
            EventType::Token,
            &request.subject,
            &format!(
                "{} {} {} {}",
                request.tenant, request.realm, mode, request.expiration_date
            ),
        );

        self.sign(&Capability {
            tenant: request.tenant.clone(),
            realm: request.realm.clone(),
            subject: request.subject.clone(),
            mode,
            expires_at,
        })
    }

    /// Signs a capability as-is, without any credential check.
    pub fn sign(&self, capability: &Capability) -> Result<String, AuthError> {
        let claims = Claims {
            iss: TOKEN_ISSUER.to_string(),
            sub: capability.subject.clone(),
            exp: capability.expires_at.timestamp(),
            tenant: capability.tenant.clone(),
            realm: capability.realm.clone(),
            mode: capability.mode.to_lowercase(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InvalidRequest(format!("could not sign token: {e}")))
    }
}

impl TokenVerifier for JwtTokenService {
    fn verify(&self, token: &str) -> Result<Capability, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AuthError::AuthenticationFailed(e.to_string()))?;
        let claims = data.claims;

        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::AuthenticationFailed("invalid expiry".into()))?;

        Ok(Capability {
            tenant: claims.tenant,
            realm: claims.realm,
            subject: claims.sub,
            mode: claims.mode,
            expires_at,
        })
    }
}

/// Returns the configured secret, or the one persisted under `base_dir`,
/// generating and persisting a random one on first start.
pub fn load_or_create_secret(configured: &str, base_dir: &Path) -> io::Result<String> {
    if !configured.trim().is_empty() {
        return Ok(configured.to_string());
    }

    info!("No JWT secret configured");
    let secret_path = base_dir.join(SECRET_FILE_NAME);

    match fs::read_to_string(&secret_path) {
        Ok(secret) if !secret.trim().is_empty() => {
            info!("JWT secret read from {}", secret_path.display());
            Ok(secret.trim().to_string())
        }
        _ => {
            info!("No JWT secret found in {}, generating one", secret_path.display());
            let mut bytes = vec![0u8; GENERATED_SECRET_BYTES];
            rand::thread_rng().fill_bytes(&mut bytes);
            let secret = hex::encode(bytes);
            fs::create_dir_all(base_dir)?;
            fs::write(&secret_path, &secret)?;
            Ok(secret)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NoopAuditSink;
    use crate::auth::credentials::hash_password;
    use chrono::Duration;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn service() -> JwtTokenService {
        let hash = hash_password("Top$ec3rit!").unwrap();
        let credentials = CredentialStore::new(HashMap::from([("acme".to_string(), hash)]));
        JwtTokenService::new(b"test-secret", credentials, Arc::new(NoopAuditSink))
    }

    fn request() -> TokenRequest {
        TokenRequest {
            tenant: "acme".into(),
            password: "Top$ec3rit!".into(),
            realm: "exam".into(),
            subject: "iPad #213".into(),
            mode: "RW".into(),
            expiration_date: Utc::now().date_naive() + Duration::days(30),
        }
    }

    #[test]
    fn issued_token_verifies_to_same_claims() {
        let service = service();
        let token = service.issue(&request()).unwrap();
        let capability = service.verify(&token).unwrap();

        assert_eq!(capability.tenant, "acme");
        assert_eq!(capability.realm, "exam");
        assert_eq!(capability.subject, "iPad #213");
        assert_eq!(capability.mode, "rw");
        assert_eq!(
            capability.expires_at,
            request().expiration_date.and_time(NaiveTime::MIN).and_utc()
        );
    }

    #[test]
    fn expiry_starts_at_midnight_in_configured_zone() {
        let zone: ExpiryZone = "+02:00".parse().unwrap();
        let service = service().with_time_zone(zone);
        let token = service.issue(&request()).unwrap();
        let capability = service.verify(&token).unwrap();

        let utc_midnight = request().expiration_date.and_time(NaiveTime::MIN).and_utc();
        assert_eq!(capability.expires_at, utc_midnight - Duration::hours(2));
    }

    #[test]
    fn time_zones_are_parsed() {
        assert_eq!("".parse::<ExpiryZone>(), Ok(ExpiryZone::Local));
        assert_eq!("Local".parse::<ExpiryZone>(), Ok(ExpiryZone::Local));
        assert_eq!("UTC".parse::<ExpiryZone>(), Ok(ExpiryZone::Utc));
        assert_eq!(
            "-05:30".parse::<ExpiryZone>(),
            Ok(ExpiryZone::Fixed(FixedOffset::west_opt(5 * 3600 + 1800).unwrap()))
        );
        assert!("Europe/Nowhere".parse::<ExpiryZone>().is_err());
    }

    #[test]
    fn wrong_password_is_denied() {
        let mut req = request();
        req.password = "nope".into();
        assert!(matches!(service().issue(&req), Err(AuthError::AccessDenied(_))));

        req.tenant = "unknown".into();
        assert!(matches!(service().issue(&req), Err(AuthError::AccessDenied(_))));
    }

    #[test]
    fn malformed_requests_are_rejected() {
        let service = service();

        let mut req = request();
        req.realm = "a/b".into();
        assert!(matches!(service.issue(&req), Err(AuthError::InvalidRequest(_))));

        let mut req = request();
        req.mode = "rx".into();
        assert!(matches!(service.issue(&req), Err(AuthError::InvalidRequest(_))));

        let mut req = request();
        req.expiration_date = Utc::now().date_naive();
        assert!(matches!(service.issue(&req), Err(AuthError::InvalidRequest(_))));

        let mut req = request();
        req.subject = "x".repeat(MAX_FIELD_LENGTH + 1);
        assert!(matches!(service.issue(&req), Err(AuthError::InvalidRequest(_))));
    }

    #[test]
    fn tampered_and_expired_tokens_fail() {
        let service = service();
        let token = service.issue(&request()).unwrap();

        let other = JwtTokenService::new(
            b"other-secret",
            CredentialStore::default(),
            Arc::new(NoopAuditSink),
        );
        assert!(matches!(
            other.verify(&token),
            Err(AuthError::AuthenticationFailed(_))
        ));

        let expired = service
            .sign(&Capability {
                tenant: "acme".into(),
                realm: "exam".into(),
                subject: "s".into(),
                mode: "r".into(),
                expires_at: Utc::now() - Duration::hours(1),
            })
            .unwrap();
        assert!(matches!(
            service.verify(&expired),
            Err(AuthError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn secret_is_generated_once_and_reused() {
        let dir = TempDir::new().unwrap();
        let first = load_or_create_secret("", dir.path()).unwrap();
        let second = load_or_create_secret("", dir.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), GENERATED_SECRET_BYTES * 2);
        assert_eq!(load_or_create_secret("configured", dir.path()).unwrap(), "configured");
    }
}
