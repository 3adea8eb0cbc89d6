//! Configuration validation with range checks.

use crate::error::ConfigError;
use tokio::sync::Semaphore;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.max_in_flight_per_host == 0 {
            return Err(ConfigError::ValidationError(
                "fetch.max_in_flight_per_host must be > 0".into(),
            ));
        }
        if self.fetch.max_in_flight_per_host > Semaphore::MAX_PERMITS {
            return Err(ConfigError::ValidationError(format!(
                "fetch.max_in_flight_per_host must be <= {} (got {})",
                Semaphore::MAX_PERMITS,
                self.fetch.max_in_flight_per_host
            )));
        }
        if self.fetch.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "fetch.timeout_ms must be > 0".into(),
            ));
        }
        if self.transport.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "transport.connect_timeout_ms must be > 0".into(),
            ));
        }
        if self.dataset.id_column.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "dataset.id_column must not be empty".into(),
            ));
        }
        if self.dataset.url_column.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "dataset.url_column must not be empty".into(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::ValidationError(format!(
                "logging.format must be \"pretty\" or \"json\" (got \"{}\")",
                self.logging.format
            )));
        }
        Ok(())
    }
}
