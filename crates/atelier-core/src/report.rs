//! Per-task outcomes and the batch failure report.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::DatasetConfig;
use crate::error::FetchError;
use crate::task::DownloadTask;

/// Failure taxonomy used in persisted reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Task had no URL; never attempted
    MissingInput,
    /// Connection, DNS, timeout or unusable URL
    Transport,
    /// Remote returned a non-2xx status
    HttpStatus,
    /// Local write failed
    Storage,
}

impl FailureKind {
    /// Whether re-driving the same task could plausibly succeed.
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureKind::MissingInput)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::MissingInput => write!(f, "missing_input"),
            FailureKind::Transport => write!(f, "transport"),
            FailureKind::HttpStatus => write!(f, "http_status"),
            FailureKind::Storage => write!(f, "storage"),
        }
    }
}

/// A file that was fully written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedFile {
    pub id: String,
    pub destination: PathBuf,
    pub bytes_written: u64,
}

/// One row of the failure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFetch {
    /// Task identifier
    pub id: String,
    /// Original URL; empty when none was supplied
    pub url: String,
    /// Failure category
    pub kind: FailureKind,
    /// One-line human-readable cause
    pub error: String,
    /// Where the file would have been written
    pub destination: PathBuf,
}

impl FailedFetch {
    pub fn new(task: &DownloadTask, error: &FetchError) -> Self {
        Self {
            id: task.id().to_string(),
            url: task.url().to_string(),
            kind: error.kind(),
            error: error.to_string(),
            destination: task.destination().to_path_buf(),
        }
    }

    /// Rebuild the task that produced this failure.
    pub fn to_task(&self) -> DownloadTask {
        DownloadTask::new(self.id.clone(), self.url.clone(), self.destination.clone())
    }

    /// Rebuild the task, re-deriving the destination inside `output_dir`.
    pub fn to_task_in(&self, output_dir: &Path, naming: &DatasetConfig) -> DownloadTask {
        DownloadTask::named(self.id.clone(), self.url.clone(), output_dir, naming)
    }
}

/// Terminal result of a single task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Succeeded(FetchedFile),
    Failed(FailedFetch),
}

impl FetchOutcome {
    pub(crate) fn failed(task: &DownloadTask, error: FetchError) -> Self {
        FetchOutcome::Failed(FailedFetch::new(task, &error))
    }

    pub fn id(&self) -> &str {
        match self {
            FetchOutcome::Succeeded(file) => &file.id,
            FetchOutcome::Failed(failure) => &failure.id,
        }
    }
}

/// Result of one batch: every failure in completion order plus counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Outcomes recorded (succeeded + failed)
    pub total: usize,
    /// Tasks whose file was written
    pub succeeded: usize,
    /// Sum of bytes written by successful tasks
    pub bytes_written: u64,
    /// Set when the batch was stopped before every task reported
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub interrupted: bool,
    /// Failed tasks, in the order they completed
    pub failures: Vec<FailedFetch>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one outcome.
    pub fn record(&mut self, outcome: FetchOutcome) {
        self.total += 1;
        match outcome {
            FetchOutcome::Succeeded(file) => {
                self.succeeded += 1;
                self.bytes_written += file.bytes_written;
            }
            FetchOutcome::Failed(failure) => self.failures.push(failure),
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failures of one category.
    pub fn failures_of(&self, kind: FailureKind) -> impl Iterator<Item = &FailedFetch> {
        self.failures.iter().filter(move |f| f.kind == kind)
    }
}
