//! Error types for the Atelier fetch pipeline.
//!
//! Errors are split by where they surface: batch-level errors abort a call
//! before any work begins, while per-task [`FetchError`]s are never raised out
//! of a batch and end up as rows in a [`BatchReport`](crate::BatchReport).

use std::path::PathBuf;
use thiserror::Error;

use crate::report::FailureKind;

/// Top-level error type for Atelier operations.
#[derive(Error, Debug)]
pub enum AtelierError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Task list could not be built from its source
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// Batch precondition violated
    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV serialization/deserialization errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Errors raised while turning a CSV or report file into download tasks.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// Source file could not be opened or parsed
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A required column is absent from the header row
    #[error("Column '{column}' not found in {path} (available: {available})")]
    MissingColumn {
        path: PathBuf,
        column: String,
        available: String,
    },

    /// A row has no identifier, so no destination name can be derived
    #[error("Row {row} in {path} has an empty '{column}' value")]
    EmptyIdentifier {
        path: PathBuf,
        row: usize,
        column: String,
    },
}

/// Fatal precondition violations for a whole batch.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BatchError {
    /// Per-host limit must admit at least one request
    #[error("max_in_flight_per_host must be >= 1 (got {0})")]
    InvalidConcurrency(usize),

    /// Per-host limit exceeds what the admission gate can hold
    #[error("max_in_flight_per_host must be <= {max} (got {limit})")]
    ConcurrencyTooLarge { limit: usize, max: usize },

    /// Per-request timeout must be positive
    #[error("timeout_ms must be > 0")]
    InvalidTimeout,
}

/// Failure of a single download task.
///
/// The `Display` output is the one-line cause written into failure reports.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Task arrived without a URL
    #[error("no URL provided")]
    MissingUrl,

    /// URL string could not be parsed into a fetchable address
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Connection, DNS, TLS or body-read failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Request did not complete within the per-task timeout
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Remote answered with a non-2xx status
    #[error("HTTP status {status}")]
    HttpStatus { status: u16 },

    /// Response could not be written to disk
    #[error("failed to write {path}: {message}")]
    Storage { path: PathBuf, message: String },

    /// Task was cancelled or panicked before producing an outcome
    #[error("download aborted: {0}")]
    Aborted(String),
}

impl FetchError {
    /// Map the detailed error onto the report taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::MissingUrl => FailureKind::MissingInput,
            FetchError::InvalidUrl(_)
            | FetchError::Transport(_)
            | FetchError::Timeout { .. }
            | FetchError::Aborted(_) => FailureKind::Transport,
            FetchError::HttpStatus { .. } => FailureKind::HttpStatus,
            FetchError::Storage { .. } => FailureKind::Storage,
        }
    }

    pub(crate) fn storage(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        FetchError::Storage {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Convenience type alias for Atelier results.
pub type Result<T> = std::result::Result<T, AtelierError>;

/// Convenience type alias for per-task fetch results.
pub type FetchResult<T> = std::result::Result<T, FetchError>;
