//! Configuration management for the depot server
//!
//! Separates startup configuration (requires restart) from runtime configuration
//! (held behind a lock and read per connection).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::auth::ExpiryZone;

/// Complete server configuration with startup/runtime separation
#[derive(Debug, Deserialize, Clone)]
pub struct DepotConfig {
    #[serde(flatten)]
    pub startup: StartupConfig,

    #[serde(flatten)]
    pub runtime: RuntimeConfig,

    /// Tenant name to admin credential
    #[serde(default)]
    pub tenants: HashMap<String, TenantConfig>,
}

/// Configuration that requires server restart to take effect
#[derive(Debug, Deserialize, Clone)]
pub struct StartupConfig {
    // ═══ NETWORK (Environment Override Supported) ═══
    pub bind_address: String,
    pub port: u16,

    // ═══ STORAGE ═══
    /// Root of all tenant data, staging area and bootstrap secrets
    pub base_directory: String,

    /// Backup rotation on differing overwrites
    pub backup: bool,

    /// Permit symbolic links below realm roots
    pub allow_symbolic_links: bool,

    /// Staging files older than this are removed by the sweeper
    pub staging_max_age_secs: u64,
    pub staging_sweep_interval_secs: u64,

    // ═══ SECURITY ═══
    /// HS256 signing secret; bootstrapped from `<base_directory>/.jwtsecret` when empty
    pub jwt_secret: String,

    /// Zone in which token expiry dates start: empty or `local` for the
    /// system zone, `UTC`, or a fixed offset such as `+02:00`
    pub time_zone: String,

    /// Longest accepted command line in bytes
    pub max_command_length: usize,
}

/// Configuration that may change while the server is running
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// Maximum concurrent clients
    /// Environment: DEPOT_MAX_CLIENTS
    pub max_clients: usize,

    /// Maximum upload size in MB
    /// Environment: DEPOT_MAX_UPLOAD_SIZE_MB
    pub max_upload_size_mb: u64,
}

/// Credential of one tenant. The password is a PHC hash string or, for
/// convenience, clear text that is hashed on load.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TenantConfig {
    #[serde(default)]
    pub password: String,
}

/// Thread-safe runtime configuration wrapper
pub type SharedRuntimeConfig = Arc<RwLock<RuntimeConfig>>;

impl DepotConfig {
    /// Load configuration from config.toml with environment overrides.
    ///
    /// The file is optional; every key has a default.
    pub fn load() -> Result<Self, ConfigError> {
        // Container layout first, then the working directory
        let config_paths = ["depot-server/config", "config"];

        let mut builder = Self::defaults(Config::builder())?;
        for config_path in config_paths {
            builder = builder.add_source(File::with_name(config_path).required(false));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("DEPOT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: DepotConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a single TOML string on top of the defaults, without the
    /// environment.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let settings = Self::defaults(Config::builder())?
            .add_source(File::from_str(source, config::FileFormat::Toml))
            .build()?;

        let config: DepotConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("bind_address", "127.0.0.1")?
            .set_default("port", 2121)?
            .set_default("base_directory", "/tmp/depot")?
            .set_default("backup", true)?
            .set_default("allow_symbolic_links", false)?
            .set_default("staging_max_age_secs", 24 * 60 * 60)?
            .set_default("staging_sweep_interval_secs", 60 * 60)?
            .set_default("jwt_secret", "")?
            .set_default("time_zone", "")?
            .set_default("max_command_length", 4096)?
            .set_default("max_clients", 50)?
            .set_default("max_upload_size_mb", 1024)
    }

    /// Split into startup (immutable) and runtime (mutable) parts
    pub fn split(self) -> (StartupConfig, SharedRuntimeConfig, HashMap<String, TenantConfig>) {
        let runtime = Arc::new(RwLock::new(self.runtime));
        (self.startup, runtime, self.tenants)
    }

    /// Validation for all configuration values
    fn validate(&self) -> Result<(), ConfigError> {
        if self.startup.base_directory.trim().is_empty() {
            return Err(ConfigError::Message(
                "base_directory cannot be empty".into(),
            ));
        }

        if self.startup.max_command_length < 64 {
            return Err(ConfigError::Message(
                "max_command_length must be at least 64".into(),
            ));
        }

        if let Err(e) = self.startup.time_zone.parse::<ExpiryZone>() {
            return Err(ConfigError::Message(e));
        }

        if self.startup.staging_sweep_interval_secs == 0 {
            return Err(ConfigError::Message(
                "staging_sweep_interval_secs must be greater than 0".into(),
            ));
        }

        if self.runtime.max_clients == 0 {
            return Err(ConfigError::Message(
                "max_clients must be greater than 0".into(),
            ));
        }

        if self.runtime.max_upload_size_mb == 0 {
            return Err(ConfigError::Message(
                "max_upload_size_mb must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

impl StartupConfig {
    /// Bind address and port as a socket address string
    pub fn listen_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn base_directory_path(&self) -> PathBuf {
        PathBuf::from(&self.base_directory)
    }

    /// Parsed `time_zone`
    pub fn expiry_zone(&self) -> Result<ExpiryZone, String> {
        self.time_zone.parse()
    }

    pub fn staging_max_age(&self) -> Duration {
        Duration::from_secs(self.staging_max_age_secs)
    }

    pub fn staging_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.staging_sweep_interval_secs)
    }
}

impl RuntimeConfig {
    /// Maximum upload size in bytes
    pub fn max_upload_size_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }
}
