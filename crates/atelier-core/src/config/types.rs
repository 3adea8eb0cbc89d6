//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Fetcher limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum simultaneous requests to one host
    pub max_in_flight_per_host: usize,

    /// Total per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_in_flight_per_host: 30,
            timeout_ms: 60_000,
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// TCP/TLS connect timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Proxy URL applied to all requests (supports ${ENV_VAR} syntax)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            user_agent: format!("atelier/{}", env!("CARGO_PKG_VERSION")),
            proxy: None,
        }
    }
}

/// Column mapping and file naming for scraped metadata CSVs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Header of the column holding the product identifier
    pub id_column: String,

    /// Header of the column holding the image URL
    pub url_column: String,

    /// Prefix of downloaded file names
    pub file_prefix: String,

    /// Extension of downloaded file names (without the dot)
    pub file_extension: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            id_column: "id".to_string(),
            url_column: "image_url".to_string(),
            file_prefix: "image_".to_string(),
            file_extension: "jpg".to_string(),
        }
    }
}

/// Default output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root directory for downloaded images; each dataset gets a subdirectory
    pub images_dir: PathBuf,

    /// Directory where failure reports are written
    pub reports_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            images_dir: PathBuf::from("~/.atelier/images"),
            reports_dir: PathBuf::from("~/.atelier/reports"),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
