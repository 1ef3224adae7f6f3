//! Configuration loading and resolution
//!
//! Settings resolve with the priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Default HTTP port for the noisemap-api service
pub const DEFAULT_PORT: u16 = 5730;

/// Environment variable names
pub const ENV_PORT: &str = "NOISEMAP_PORT";
pub const ENV_DATABASE: &str = "NOISEMAP_DATABASE";
pub const ENV_MODEL: &str = "NOISEMAP_MODEL";

/// TOML configuration file contents (`~/.config/noisemap/config.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// HTTP listen port
    pub port: Option<u16>,
    /// Path to the SQLite database file
    pub database_path: Option<PathBuf>,
    /// Path to the classifier artifact (absent = run without a model)
    pub model_path: Option<PathBuf>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub database_path: PathBuf,
    pub model_path: Option<PathBuf>,
}

/// Load a TOML config file, tolerating a missing file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        return Ok(TomlConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read config failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse config failed: {}", e)))
}

/// Default configuration file path for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("noisemap").join("config.toml"))
}

/// OS-dependent default data directory (database lives here)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("noisemap"))
        .unwrap_or_else(|| PathBuf::from("./noisemap_data"))
}

impl ServiceConfig {
    /// Resolve configuration from CLI arguments, environment, and TOML file
    pub fn resolve(
        cli_port: Option<u16>,
        cli_database: Option<PathBuf>,
        cli_model: Option<PathBuf>,
    ) -> Result<Self> {
        let toml_config = match default_config_path() {
            Some(path) => load_toml_config(&path)?,
            None => TomlConfig::default(),
        };

        let port = match cli_port {
            Some(p) => p,
            None => match std::env::var(ENV_PORT) {
                Ok(v) => v
                    .parse::<u16>()
                    .map_err(|_| Error::Config(format!("Invalid {}: {}", ENV_PORT, v)))?,
                Err(_) => toml_config.port.unwrap_or(DEFAULT_PORT),
            },
        };

        let database_path = cli_database
            .or_else(|| std::env::var(ENV_DATABASE).ok().map(PathBuf::from))
            .or(toml_config.database_path)
            .unwrap_or_else(|| default_data_dir().join("noisemap.db"));

        let model_path = cli_model
            .or_else(|| std::env::var(ENV_MODEL).ok().map(PathBuf::from))
            .or(toml_config.model_path);

        info!(
            port = port,
            database = %database_path.display(),
            model = ?model_path.as_ref().map(|p| p.display().to_string()),
            "Configuration resolved"
        );

        Ok(Self {
            port,
            database_path,
            model_path,
        })
    }
}
