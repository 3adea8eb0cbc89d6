//! Running one batch: progress bar, Ctrl-C handling, report persistence, summary.

use atelier_core::{
    write_report, BatchReport, DownloadTask, FailureKind, FetchOutcome, Fetcher, ReportFormat,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Run a batch and persist its failure report.
///
/// The report is written even for an empty batch. On Ctrl-C the remaining
/// downloads are aborted and the report contains only the outcomes observed
/// so far, flagged as interrupted.
pub async fn run_batch(
    fetcher: &Fetcher,
    tasks: Vec<DownloadTask>,
    report_path: &Path,
    report_format: ReportFormat,
) -> anyhow::Result<BatchReport> {
    let total = tasks.len();
    let progress = create_progress_bar(total as u64);
    let observed = Arc::new(Mutex::new(BatchReport::new()));
    let start_time = Instant::now();

    let run = {
        let progress = progress.clone();
        let observed = observed.clone();
        fetcher.fetch_all_with(tasks, move |outcome| {
            progress.inc(1);
            if let Ok(mut report) = observed.lock() {
                report.record(outcome.clone());
                if let FetchOutcome::Failed(_) = outcome {
                    progress.set_message(format!("{} failed", report.failed()));
                }
            }
        })
    };

    let report = tokio::select! {
        result = run => result?,
        _ = tokio::signal::ctrl_c() => {
            progress.abandon_with_message("interrupted");
            let mut partial = observed
                .lock()
                .map(|r| r.clone())
                .unwrap_or_default();
            partial.interrupted = true;
            tracing::warn!(
                "Interrupted: {} of {} download(s) finished; saving partial report",
                partial.total,
                total
            );
            partial
        }
    };

    let elapsed = start_time.elapsed();
    progress.finish_and_clear();

    write_report(report_path, &report, report_format)?;
    print_summary(&report, elapsed);

    if report.interrupted {
        anyhow::bail!(
            "Interrupted before all downloads finished.\n  Partial report: {}",
            report_path.display()
        );
    }

    if !report.is_clean() {
        tracing::info!(
            "Re-drive failures with: atelier retry {}",
            report_path.display()
        );
    }

    Ok(report)
}

/// Create a progress bar for a download batch.
fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    pb.set_message("starting...");
    pb
}

/// Print a formatted summary table after a batch.
fn print_summary(report: &BatchReport, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        report.total as f64 / secs
    } else {
        0.0
    };
    let mb_written = report.bytes_written as f64 / 1_000_000.0;

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Downloaded:   {:>8}", report.succeeded);
    if report.failed() > 0 {
        eprintln!("    Failed:       {:>8}", report.failed());
        for kind in [
            FailureKind::MissingInput,
            FailureKind::Transport,
            FailureKind::HttpStatus,
            FailureKind::Storage,
        ] {
            let count = report.failures_of(kind).count();
            if count > 0 {
                eprintln!("      {:<14}{:>8}", kind.to_string(), count);
            }
        }
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Total:        {:>8}", report.total);
    eprintln!("    Written:      {:>7.1} MB", mb_written);
    eprintln!("    Duration:     {:>7.1}s", secs);
    eprintln!("    Rate:         {:>7.1} img/sec", rate);
    eprintln!("  ====================================");
}
