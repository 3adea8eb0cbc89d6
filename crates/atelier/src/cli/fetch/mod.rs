//! The `atelier fetch` command for downloading a dataset's images.

mod batch;
mod setup;
pub mod types;

pub use types::{FetchTuning, ReportFormatArg};

pub(crate) use batch::run_batch;
pub(crate) use setup::{build_fetcher, load_config, resolve_report_target};

use atelier_core::config::expand_path;
use atelier_core::dataset::{dataset_dir, dataset_name};
use atelier_core::{Config, Dataset};
use clap::Args;
use std::path::PathBuf;

/// Arguments for the `fetch` command.
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Metadata CSV with one product per row
    #[arg(required = true)]
    pub input: PathBuf,

    /// Directory for downloaded images (defaults to <images_dir>/<csv name>)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Failure report path (defaults to <reports_dir>/bad_urls_<csv name>.<ext>)
    #[arg(short, long)]
    pub report: Option<PathBuf>,

    /// Failure report format (inferred from --report extension, else csv)
    #[arg(long, value_enum)]
    pub report_format: Option<ReportFormatArg>,

    /// Column holding the product identifier
    #[arg(long)]
    pub id_column: Option<String>,

    /// Column holding the image URL
    #[arg(long)]
    pub url_column: Option<String>,

    #[command(flatten)]
    pub tuning: FetchTuning,
}

/// Execute the fetch command.
pub async fn execute(args: FetchArgs) -> anyhow::Result<()> {
    let mut config = load_config(&args.tuning)?;
    apply_columns(&mut config, &args);

    let input = expand_path(&args.input);
    let output_dir = match &args.output_dir {
        Some(dir) => expand_path(dir),
        None => dataset_dir(&config.images_dir(), &input),
    };

    let dataset = Dataset::from_csv_path(&input, &config.dataset, &output_dir)?;
    if dataset.is_empty() {
        tracing::warn!("No rows found in {:?}; writing an empty report", input);
    } else {
        tracing::info!(
            "Loaded {} row(s) from {:?} ({} without URL)",
            dataset.len(),
            input,
            dataset.missing_urls()
        );
    }
    tracing::info!(
        "Writing images to {:?} (max {} per host)",
        output_dir,
        config.fetch.max_in_flight_per_host
    );

    let (report_path, report_format) = resolve_report_target(
        args.report.as_deref(),
        args.report_format,
        &config.reports_dir(),
        &format!("bad_urls_{}", dataset_name(&input)),
    );

    let fetcher = build_fetcher(&config)?;
    run_batch(&fetcher, dataset.into_tasks(), &report_path, report_format).await?;
    Ok(())
}

/// Apply column overrides on top of the `[dataset]` section.
fn apply_columns(config: &mut Config, args: &FetchArgs) {
    if let Some(column) = &args.id_column {
        config.dataset.id_column = column.clone();
    }
    if let Some(column) = &args.url_column {
        config.dataset.url_column = column.clone();
    }
}
