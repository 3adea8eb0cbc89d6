//! Download task definition and deterministic destination naming.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::DatasetConfig;

/// One URL to fetch into one file.
///
/// Fields are private so a task cannot change after it is queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTask {
    id: String,
    url: String,
    destination: PathBuf,
}

impl DownloadTask {
    /// Create a task. An empty `url` is allowed and fails at fetch time.
    pub fn new(id: impl Into<String>, url: impl Into<String>, destination: PathBuf) -> Self {
        Self {
            id: id.into(),
            url: url.into().trim().to_string(),
            destination,
        }
    }

    /// Create a task whose destination is derived from the identifier.
    pub fn named(
        id: impl Into<String>,
        url: impl Into<String>,
        output_dir: &Path,
        naming: &DatasetConfig,
    ) -> Self {
        let id = id.into();
        let destination = destination_for(output_dir, &id, naming);
        Self::new(id, url, destination)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// True when there is nothing to fetch.
    pub fn has_url(&self) -> bool {
        !self.url.is_empty()
    }
}

/// Build `<dir>/<prefix><id>.<ext>`, e.g. `images/image_1042.jpg`.
///
/// Path separators in the identifier are replaced so an id can never
/// escape the output directory.
pub fn destination_for(output_dir: &Path, id: &str, naming: &DatasetConfig) -> PathBuf {
    let safe_id: String = id
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            other => other,
        })
        .collect();
    let ext = naming.file_extension.trim_start_matches('.');
    let file_name = if ext.is_empty() {
        format!("{}{}", naming.file_prefix, safe_id)
    } else {
        format!("{}{}.{}", naming.file_prefix, safe_id, ext)
    };
    output_dir.join(file_name)
}
