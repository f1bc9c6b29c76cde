//! Shared server state
//!
//! Everything a connection handler needs, built once from the configuration.

use log::info;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audit::FileAuditSink;
use crate::auth::token::load_or_create_secret;
use crate::auth::{CredentialStore, JwtTokenService, ScopeResolver};
use crate::config::{SharedRuntimeConfig, StartupConfig, TenantConfig};
use crate::storage::StorageEngine;

pub struct AppState {
    pub base_dir: PathBuf,
    pub engine: StorageEngine,
    pub resolver: ScopeResolver,
    pub tokens: JwtTokenService,
    pub audit_log: Arc<FileAuditSink>,
    pub runtime: SharedRuntimeConfig,
    pub max_command_length: usize,
}

impl AppState {
    /// Creates the base directory and bootstraps secrets and credentials
    /// beneath it.
    pub fn new(
        startup: &StartupConfig,
        runtime: SharedRuntimeConfig,
        tenants: HashMap<String, TenantConfig>,
    ) -> io::Result<Self> {
        let base_dir = prepare_base_dir(&startup.base_directory_path())?;
        info!("Base directory: {}", base_dir.display());

        let audit_log = Arc::new(FileAuditSink::new(&base_dir));

        let credentials = CredentialStore::from_config(
            tenants.into_iter().map(|(tenant, c)| (tenant, c.password)),
            &base_dir,
        )?;
        let secret = load_or_create_secret(&startup.jwt_secret, &base_dir)?;
        let zone = startup
            .expiry_zone()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        info!("Token expiry time zone: {:?}", zone);
        let tokens = JwtTokenService::new(secret.as_bytes(), credentials, audit_log.clone())
            .with_time_zone(zone);

        let engine = StorageEngine::new(&base_dir, audit_log.clone())
            .with_backup(startup.backup)
            .with_symbolic_links(startup.allow_symbolic_links);

        Ok(Self {
            resolver: ScopeResolver::new(&base_dir),
            base_dir,
            engine,
            tokens,
            audit_log,
            runtime,
            max_command_length: startup.max_command_length,
        })
    }
}

/// Creates the base directory if needed and returns its canonical path, so
/// lock keys and containment checks all work on one spelling.
fn prepare_base_dir(configured: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(configured)?;
    configured.canonicalize()
}
