//! Configuration for the directory node

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::common::{Error, Result};

/// Default configuration file name (extension resolved by the `config` crate)
pub const DEFAULT_CONFIG_FILE: &str = "backupdir";

/// Prefix of environment variable overrides, e.g. `BACKUPDIR_BIND_ADDR`
pub const ENV_PREFIX: &str = "BACKUPDIR";

/// Which store implementation backs the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Rocksdb,
}

impl std::str::FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreBackend::Memory),
            "rocksdb" | "rocks" => Ok(StoreBackend::Rocksdb),
            other => Err(Error::InvalidConfig(format!("unknown backend: {}", other))),
        }
    }
}

/// Directory node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bind address for the HTTP API
    pub bind_addr: SocketAddr,

    /// Store implementation
    pub backend: StoreBackend,

    /// RocksDB path (rocksdb backend only)
    pub db_path: PathBuf,

    /// Drop registered servers and file records at startup, keeping accounts
    pub reset_fleet_on_start: bool,

    /// Logging level (EnvFilter syntax)
    pub log_level: String,

    /// Audit log file (JSON lines); audit records always go to tracing too
    pub audit_log: Option<PathBuf>,

    /// Maximum accepted request body
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            backend: StoreBackend::Rocksdb,
            db_path: PathBuf::from("./backupdir-data"),
            reset_fleet_on_start: true,
            log_level: "info".to_string(),
            audit_log: None,
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then `BACKUPDIR_*` environment variables.
    ///
    /// A missing file is not an error; defaults fill every absent field.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend == StoreBackend::Rocksdb && self.db_path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "rocksdb backend requires db_path".into(),
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(Error::InvalidConfig(
                "max_body_bytes must be positive".into(),
            ));
        }
        Ok(())
    }
}
