//! The `atelier retry` command for re-driving a previous failure report.

use atelier_core::config::expand_path;
use atelier_core::{Dataset, ReportFormat};
use clap::Args;
use std::path::{Path, PathBuf};

use super::fetch::{build_fetcher, load_config, run_batch, FetchTuning, ReportFormatArg};

/// Arguments for the `retry` command.
#[derive(Args, Debug)]
pub struct RetryArgs {
    /// Failure report written by `atelier fetch`
    #[arg(required = true)]
    pub report: PathBuf,

    /// Format of the input report (inferred from its extension, else csv)
    #[arg(long, value_enum)]
    pub format: Option<ReportFormatArg>,

    /// Re-derive destinations under this directory instead of reusing recorded ones
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Where to write the new report (defaults to <report>_retry.<ext>; format follows its extension)
    #[arg(long)]
    pub new_report: Option<PathBuf>,

    #[command(flatten)]
    pub tuning: FetchTuning,
}

/// Execute the retry command.
pub async fn execute(args: RetryArgs) -> anyhow::Result<()> {
    let config = load_config(&args.tuning)?;

    let input = expand_path(&args.report);
    let input_format = args
        .format
        .map(ReportFormat::from)
        .or_else(|| ReportFormat::from_path(&input))
        .unwrap_or(ReportFormat::Csv);

    let output_dir = args.output_dir.as_deref().map(expand_path);
    let dataset =
        Dataset::from_report_path(&input, input_format, output_dir.as_deref(), &config.dataset)?;

    if dataset.is_empty() {
        tracing::info!("Nothing to retry in {:?}", input);
        return Ok(());
    }
    tracing::info!("Retrying {} failed download(s) from {:?}", dataset.len(), input);

    let (report_path, report_format) = retry_report_target(
        &input,
        input_format,
        args.new_report.as_deref(),
        &dataset.name,
    );

    let fetcher = build_fetcher(&config)?;
    run_batch(&fetcher, dataset.into_tasks(), &report_path, report_format).await?;
    Ok(())
}

/// Where the retry pass writes its own report.
///
/// An explicit `--new-report` picks its format from its extension, falling
/// back to the input's. Otherwise the report lands beside the input as
/// `<stem>.<input ext>`.
fn retry_report_target(
    input: &Path,
    input_format: ReportFormat,
    new_report: Option<&Path>,
    stem: &str,
) -> (PathBuf, ReportFormat) {
    match new_report {
        Some(path) => (
            expand_path(path),
            ReportFormat::from_path(path).unwrap_or(input_format),
        ),
        None => {
            let dir = input.parent().map(Path::to_path_buf).unwrap_or_default();
            (
                dir.join(format!("{stem}.{}", input_format.extension())),
                input_format,
            )
        }
    }
}
