//! Tenant credentials
//!
//! Admin passwords per tenant, kept as scrypt PHC strings. Only token
//! issuance and audit log access check them.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use log::{error, info, warn};
use rand::RngCore;
use scrypt::Scrypt;
use scrypt::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

/// Tenant created when no tenant is configured.
pub const DEFAULT_TENANT_NAME: &str = "default";

const DEFAULT_TENANT_FILE_NAME: &str = ".default";
const SALT_BYTES: usize = 16;
const GENERATED_PASSWORD_BYTES: usize = 16;

/// Hashes `password` into a PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let mut salt = [0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt)?;
    Ok(Scrypt.hash_password(password.as_bytes(), &salt)?.to_string())
}

fn is_phc_hash(value: &str) -> bool {
    PasswordHash::new(value).is_ok()
}

/// Maps tenant names to password hashes.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    hashes: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new(hashes: HashMap<String, String>) -> Self {
        Self { hashes }
    }

    /// Builds the store from configured tenants.
    ///
    /// Passwords may be given as PHC strings or in clear text; clear text is
    /// hashed on load. Without any usable tenant the default tenant is
    /// bootstrapped from `<base_dir>/.default`.
    pub fn from_config(
        tenants: impl IntoIterator<Item = (String, String)>,
        base_dir: &Path,
    ) -> io::Result<Self> {
        let mut hashes = HashMap::new();
        let mut missing_password = false;

        for (tenant, password) in tenants {
            if password.trim().is_empty() {
                if tenant != DEFAULT_TENANT_NAME {
                    info!("Tenant {} is missing a password", tenant);
                    missing_password = true;
                }
                continue;
            }

            info!("Found tenant {} in configuration", tenant);
            let hash = if is_phc_hash(&password) {
                password
            } else {
                warn!("Password of tenant {} is not hashed, hashing it now", tenant);
                hash_password(&password).map_err(io::Error::other)?
            };
            hashes.insert(tenant, hash);
        }

        if !missing_password && !hashes.is_empty() {
            return Ok(Self::new(hashes));
        }

        info!("No usable tenants configured");
        let hash = load_or_create_default_tenant(base_dir)?;
        Ok(Self::new(HashMap::from([(
            DEFAULT_TENANT_NAME.to_string(),
            hash,
        )])))
    }

    pub fn contains(&self, tenant: &str) -> bool {
        self.hashes.contains_key(tenant)
    }

    /// True when `tenant` exists and `password` matches its hash.
    pub fn verify(&self, tenant: &str, password: &str) -> bool {
        let Some(stored) = self.hashes.get(tenant) else {
            return false;
        };
        match PasswordHash::new(stored) {
            Ok(parsed) => Scrypt.verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(e) => {
                error!("Stored password hash of tenant {} is unreadable: {}", tenant, e);
                false
            }
        }
    }
}

fn load_or_create_default_tenant(base_dir: &Path) -> io::Result<String> {
    let path = base_dir.join(DEFAULT_TENANT_FILE_NAME);

    if let Ok(stored) = fs::read_to_string(&path) {
        let stored = stored.trim();
        if is_phc_hash(stored) {
            info!("Default tenant password read from {}", path.display());
            return Ok(stored.to_string());
        }
        warn!("Ignoring unreadable default tenant password in {}", path.display());
    } else {
        info!("No default tenant password found in {}", path.display());
    }

    let mut bytes = [0u8; GENERATED_PASSWORD_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let password = hex::encode(bytes);
    error!("!!!!!!!!!!!!!!!! DEFAULT TENANT PASSWORD = {} !!!!!!!!!!!!!!!!", password);

    let hash = hash_password(&password).map_err(io::Error::other)?;
    fs::create_dir_all(base_dir)?;
    fs::write(&path, &hash)?;
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn verify_accepts_only_matching_password() {
        let store = CredentialStore::new(HashMap::from([(
            "acme".to_string(),
            hash_password("s3cret").unwrap(),
        )]));

        assert!(store.verify("acme", "s3cret"));
        assert!(!store.verify("acme", "S3cret"));
        assert!(!store.verify("other", "s3cret"));
    }

    #[test]
    fn clear_text_passwords_are_hashed_on_load() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::from_config(
            [("acme".to_string(), "plain".to_string())],
            dir.path(),
        )
        .unwrap();

        assert!(store.verify("acme", "plain"));
        assert!(!store.contains(DEFAULT_TENANT_NAME));
        assert!(!dir.path().join(DEFAULT_TENANT_FILE_NAME).exists());
    }

    #[test]
    fn default_tenant_is_bootstrapped_and_persisted() {
        let dir = TempDir::new().unwrap();

        let first = CredentialStore::from_config(Vec::new(), dir.path()).unwrap();
        assert!(first.contains(DEFAULT_TENANT_NAME));
        let persisted = fs::read_to_string(dir.path().join(DEFAULT_TENANT_FILE_NAME)).unwrap();

        let second = CredentialStore::from_config(
            [(DEFAULT_TENANT_NAME.to_string(), String::new())],
            dir.path(),
        )
        .unwrap();
        assert_eq!(second.hashes[DEFAULT_TENANT_NAME], persisted);
    }

    #[test]
    fn tenant_without_password_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::from_config(
            [
                ("acme".to_string(), "pw".to_string()),
                ("broken".to_string(), " ".to_string()),
            ],
            dir.path(),
        )
        .unwrap();

        assert!(store.contains(DEFAULT_TENANT_NAME));
        assert!(!store.contains("acme"));
    }
}
