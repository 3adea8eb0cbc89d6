//! Building download tasks from scraped metadata.
//!
//! A dataset is a CSV export with one product per row. Two columns matter:
//! the product identifier and the image URL. Everything else is ignored.

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::config::DatasetConfig;
use crate::error::DatasetError;
use crate::output::{read_failures, ReportFormat};
use crate::report::FailedFetch;
use crate::task::DownloadTask;

/// Tasks loaded from one source file.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Source file stem, used to name the per-dataset image directory
    pub name: String,
    /// One task per row
    pub tasks: Vec<DownloadTask>,
}

impl Dataset {
    /// Load a metadata CSV, writing images under `output_dir`.
    pub fn from_csv_path(
        path: &Path,
        config: &DatasetConfig,
        output_dir: &Path,
    ) -> Result<Self, DatasetError> {
        let file = std::fs::File::open(path).map_err(|e| DatasetError::Read {
            path: path.to_path_buf(),
            source: csv::Error::from(e),
        })?;
        Self::from_csv_reader(file, path, config, output_dir)
    }

    /// Load CSV rows from any reader. `source` is only used for naming and errors.
    pub fn from_csv_reader<R: Read>(
        reader: R,
        source: &Path,
        config: &DatasetConfig,
        output_dir: &Path,
    ) -> Result<Self, DatasetError> {
        let read_err = |e: csv::Error| DatasetError::Read {
            path: source.to_path_buf(),
            source: e,
        };

        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(read_err)?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let id_idx = column_index(&headers, &config.id_column, source)?;
        let url_idx = column_index(&headers, &config.url_column, source)?;

        let mut tasks = Vec::new();
        for (i, record) in csv_reader.records().enumerate() {
            let record = record.map_err(read_err)?;
            // Header is line 1
            let row = i + 2;
            let id = record.get(id_idx).unwrap_or_default();
            if id.is_empty() {
                return Err(DatasetError::EmptyIdentifier {
                    path: source.to_path_buf(),
                    row,
                    column: config.id_column.clone(),
                });
            }
            let url = record.get(url_idx).unwrap_or_default();
            if url.is_empty() {
                tracing::debug!("Row {row}: no URL for id {id}");
            }
            tasks.push(DownloadTask::named(id, url, output_dir, config));
        }

        tracing::debug!("Loaded {} task(s) from {:?}", tasks.len(), source);

        Ok(Self {
            name: dataset_name(source),
            tasks,
        })
    }

    /// Rebuild the retryable subset of a previous run's failures.
    ///
    /// With `output_dir`, destinations are re-derived there; otherwise each
    /// failure's recorded destination is reused.
    pub fn from_failures(
        name: impl Into<String>,
        failures: &[FailedFetch],
        output_dir: Option<&Path>,
        config: &DatasetConfig,
    ) -> Self {
        let tasks = failures
            .iter()
            .filter(|f| f.kind.is_retryable())
            .map(|f| match output_dir {
                Some(dir) => f.to_task_in(dir, config),
                None => f.to_task(),
            })
            .collect();
        Self {
            name: name.into(),
            tasks,
        }
    }

    /// Load a persisted failure report and rebuild its retryable subset.
    ///
    /// The dataset is named `<report stem>_retry`.
    pub fn from_report_path(
        path: &Path,
        format: ReportFormat,
        output_dir: Option<&Path>,
        config: &DatasetConfig,
    ) -> crate::error::Result<Self> {
        let failures = read_failures(path, format)?;
        let dataset = Self::from_failures(
            format!("{}_retry", dataset_name(path)),
            &failures,
            output_dir,
            config,
        );
        let skipped = failures.len() - dataset.len();
        if skipped > 0 {
            tracing::info!("Skipping {skipped} report row(s) without a URL");
        }
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of rows without a URL.
    pub fn missing_urls(&self) -> usize {
        self.tasks.iter().filter(|t| !t.has_url()).count()
    }

    /// Consume the dataset, yielding its tasks.
    pub fn into_tasks(self) -> Vec<DownloadTask> {
        self.tasks
    }
}

fn column_index(headers: &[String], column: &str, source: &Path) -> Result<usize, DatasetError> {
    headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| DatasetError::MissingColumn {
            path: source.to_path_buf(),
            column: column.to_string(),
            available: headers.join(", "),
        })
}

/// File stem of the source, e.g. `farfetch_women` for `farfetch_women.csv`.
pub fn dataset_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "dataset".to_string())
}

/// Default per-dataset image directory: `<images_root>/<dataset name>`.
pub fn dataset_dir(images_root: &Path, source: &Path) -> PathBuf {
    images_root.join(dataset_name(source))
}
