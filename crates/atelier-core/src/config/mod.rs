//! Configuration management for Atelier.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults. Every section implements `Default`, so a partial file is enough.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use crate::fetcher::FetchOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Atelier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fetcher limits
    pub fetch: FetchConfig,

    /// HTTP client settings
    pub transport: TransportConfig,

    /// CSV column mapping and file naming
    pub dataset: DatasetConfig,

    /// Output locations
    pub paths: PathsConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.atelier.atelier/config.toml
    /// - Linux: ~/.config/atelier/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\atelier\config\config.toml
    ///
    /// Falls back to ~/.atelier/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "atelier", "atelier")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".atelier").join("config.toml")
            })
    }

    /// Get the resolved image root directory (with ~ expansion).
    pub fn images_dir(&self) -> PathBuf {
        expand_path(&self.paths.images_dir)
    }

    /// Get the resolved report directory (with ~ expansion).
    pub fn reports_dir(&self) -> PathBuf {
        expand_path(&self.paths.reports_dir)
    }

    /// Fetcher options derived from the `[fetch]` section.
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            max_in_flight_per_host: self.fetch.max_in_flight_per_host,
            timeout_ms: self.fetch.timeout_ms,
        }
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

/// Expand a leading `~` in a path.
pub fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(&path_str);
    PathBuf::from(expanded.into_owned())
}
