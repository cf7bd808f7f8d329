//! Unified configuration for the unicontact server and tools.
//!
//! Configuration is loaded with precedence: CLI args > Env vars > Config file > Defaults
//!
//! # Example config file (unicontact.toml)
//! ```toml
//! [server]
//! listen = "0.0.0.0:8000"
//!
//! [storage]
//! data_dir = "/var/lib/unicontact"
//! cache_capacity = 100000
//!
//! [logging]
//! filter = "unicontact=debug,info"
//! ```
//!
//! Environment variables use the `UNICONTACT_` prefix with `__` between
//! nesting levels, e.g. `UNICONTACT_STORAGE__DATA_DIR=/tmp/contacts`.

mod defaults;

pub use defaults::*;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Main configuration for unicontact components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniContactConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Contact storage configuration
    pub storage: StorageConfig,
    /// Root resolution limits
    pub resolver: ResolverConfig,
    /// Log output configuration
    pub logging: LoggingConfig,
}

impl UniContactConfig {
    /// Load configuration with precedence: CLI args > Env > File > Defaults
    ///
    /// # Arguments
    /// * `config_path` - Optional path to TOML config file
    /// * `overrides` - CLI overrides to apply on top
    pub fn load(
        config_path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        Self::figment(config_path, overrides)
            .extract()
            .map_err(ConfigError::from)
    }

    /// Load from environment and optional config file only (no CLI overrides)
    pub fn from_env(config_path: Option<&str>) -> Result<Self, ConfigError> {
        Self::load(config_path, ConfigOverrides::default())
    }

    fn figment(config_path: Option<&str>, overrides: ConfigOverrides) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(UniContactConfig::default()));

        // Layer 1: Config file (if provided)
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Layer 2: Environment variables with UNICONTACT_ prefix
        figment = figment.merge(Env::prefixed("UNICONTACT_").split("__"));

        // Layer 3: CLI overrides
        figment.merge(Serialized::defaults(overrides))
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub listen: SocketAddr,
    /// Maximum request body size in bytes
    pub body_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN_ADDR,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

/// Contact storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// RocksDB directory; contacts are kept in memory only when unset
    pub data_dir: Option<PathBuf>,
    /// Contacts held in the persistent store's read cache
    pub cache_capacity: usize,
    /// Run repair on startup
    pub repair: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            repair: false,
        }
    }
}

/// Root resolution limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Extra cap on hops per root walk; the store size always bounds it
    pub max_chain_hops: Option<usize>,
}

/// Log output configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber` env-filter directive
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// CLI overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingOverrides>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen: Option<SocketAddr>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}

/// Listen address honoring a bare `PORT` variable, as hosted platforms set it.
///
/// The port replaces the one in `listen` and binds all interfaces; an
/// unparsable value is an error rather than a silent fallback.
pub fn listen_from_port(listen: SocketAddr, port: Option<&str>) -> Result<SocketAddr, ConfigError> {
    let Some(raw) = port else {
        return Ok(listen);
    };
    let port: u16 = raw.trim().parse().map_err(|_| ConfigError {
        message: format!("invalid PORT value {raw:?}"),
    })?;
    Ok(SocketAddr::from(([0, 0, 0, 0], port)))
}
