//! Atelier Core - image acquisition for fashion dataset pipelines.
//!
//! Takes (identifier, URL) pairs scraped from product listings and downloads
//! each image to a deterministic file name, limiting how many requests hit a
//! single host at once. Individual failures never abort a batch; they are
//! returned in a [`BatchReport`] that can be persisted and re-driven later.
//!
//! # Architecture
//!
//! ```text
//! metadata CSV → Dataset → DownloadTask[] → Fetcher (per-host gate) → files + BatchReport
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use atelier_core::{Config, Dataset, Fetcher, HttpTransport};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> atelier_core::Result<()> {
//!     let config = Config::load()?;
//!     let dataset = Dataset::from_csv_path("women.csv".as_ref(), &config.dataset, "images".as_ref())?;
//!     let transport = HttpTransport::new(&config.transport)?;
//!     let fetcher = Fetcher::new(Arc::new(transport), config.fetch_options());
//!
//!     let report = fetcher.fetch_all(dataset.into_tasks()).await?;
//!     println!("{} failed", report.failed());
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod dataset;
pub mod error;
pub mod fetcher;
pub mod output;
pub mod report;
pub mod task;
pub mod transport;

// Re-exports for convenient access
pub use config::Config;
pub use dataset::Dataset;
pub use error::{AtelierError, BatchError, ConfigError, DatasetError, FetchError, Result};
pub use fetcher::{FetchOptions, Fetcher};
pub use output::{read_failures, write_report, ReportFormat};
pub use report::{BatchReport, FailedFetch, FailureKind, FetchOutcome, FetchedFile};
pub use task::DownloadTask;
pub use transport::{HttpTransport, Transport, TransportResponse};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
