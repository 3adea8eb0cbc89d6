//! Fetch setup: config overrides, transport creation, report target resolution.

use atelier_core::config::expand_path;
use atelier_core::{Config, Fetcher, HttpTransport, ReportFormat, Transport};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::types::{FetchTuning, ReportFormatArg};

/// Load configuration and apply CLI overrides.
pub fn load_config(tuning: &FetchTuning) -> anyhow::Result<Config> {
    let mut config = Config::load()?;
    apply_tuning(&mut config, tuning);
    config.fetch_options().validate()?;
    Ok(config)
}

/// Apply command-line overrides on top of file configuration.
pub fn apply_tuning(config: &mut Config, tuning: &FetchTuning) {
    if let Some(limit) = tuning.max_per_host {
        config.fetch.max_in_flight_per_host = limit;
    }
    if let Some(timeout_ms) = tuning.timeout_ms {
        config.fetch.timeout_ms = timeout_ms;
    }
    if let Some(proxy) = &tuning.proxy {
        config.transport.proxy = Some(proxy.clone()).filter(|p| !p.is_empty());
    }
}

/// Build a fetcher over the real HTTP transport.
pub fn build_fetcher(config: &Config) -> anyhow::Result<Fetcher> {
    let transport = HttpTransport::new(&config.transport)?;
    tracing::debug!(
        "Transport: {} (connect timeout {}ms)",
        transport.name(),
        config.transport.connect_timeout_ms
    );
    Ok(Fetcher::new(Arc::new(transport), config.fetch_options()))
}

/// Decide where and how the failure report is written.
///
/// Explicit format wins, then the extension of an explicit path, then CSV.
/// Without a path the report goes to `<default_dir>/<default_stem>.<ext>`.
pub fn resolve_report_target(
    path: Option<&Path>,
    format: Option<ReportFormatArg>,
    default_dir: &Path,
    default_stem: &str,
) -> (PathBuf, ReportFormat) {
    let format = format
        .map(ReportFormat::from)
        .or_else(|| path.and_then(ReportFormat::from_path))
        .unwrap_or(ReportFormat::Csv);

    let path = match path {
        Some(p) => expand_path(p),
        None => default_dir.join(format!("{default_stem}.{}", format.extension())),
    };
    (path, format)
}
