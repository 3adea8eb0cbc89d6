//! Report persistence in CSV, JSON and JSONL.
//!
//! CSV is the default because failure lists usually end up next to the
//! scraped metadata CSVs. JSON keeps the full report including counters.

use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::report::{BatchReport, FailedFetch};

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// One failure per row: id,url,kind,error,destination
    Csv,
    /// The whole report as one JSON object
    Json,
    /// One failure object per line (newline-delimited JSON)
    JsonLines,
}

impl ReportFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }

    /// Infer the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::parse)
    }

    /// File extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::JsonLines => "jsonl",
        }
    }
}

/// A writer that serializes items to JSON or JSONL format.
pub struct OutputWriter<W: Write> {
    writer: W,
    lines: bool,
    pretty: bool,
    items_written: usize,
}

impl<W: Write> OutputWriter<W> {
    /// Create a new output writer.
    ///
    /// * `lines` - one object per line (JSONL) instead of a single document
    /// * `pretty` - pretty-print; ignored for JSONL
    pub fn new(writer: W, lines: bool, pretty: bool) -> Self {
        Self {
            writer,
            lines,
            pretty,
            items_written: 0,
        }
    }

    /// Write a single item.
    pub fn write<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        if self.pretty && !self.lines {
            serde_json::to_writer_pretty(&mut self.writer, item).map_err(io::Error::other)?;
        } else {
            // JSONL is never pretty-printed (one object per line)
            serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?;
        }
        writeln!(self.writer)?;
        self.items_written += 1;
        Ok(())
    }

    /// Write multiple items.
    ///
    /// For JSON, writes a single array. For JSONL, one object per line.
    pub fn write_all<T: Serialize>(&mut self, items: &[T]) -> io::Result<()> {
        if self.lines {
            for item in items {
                self.write(item)?;
            }
            return Ok(());
        }
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, items).map_err(io::Error::other)?;
        } else {
            serde_json::to_writer(&mut self.writer, items).map_err(io::Error::other)?;
        }
        writeln!(self.writer)?;
        self.items_written += items.len();
        Ok(())
    }

    /// Get the number of items written.
    pub fn items_written(&self) -> usize {
        self.items_written
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Write a report to any writer.
pub fn write_report_to<W: Write>(
    writer: W,
    report: &BatchReport,
    format: ReportFormat,
) -> Result<()> {
    match format {
        ReportFormat::Csv => {
            let mut csv_writer = csv::Writer::from_writer(writer);
            if report.failures.is_empty() {
                // Header-only file still tells the reader which columns to expect
                csv_writer.write_record(["id", "url", "kind", "error", "destination"])?;
            }
            for failure in &report.failures {
                csv_writer.serialize(failure)?;
            }
            csv_writer.flush()?;
        }
        ReportFormat::Json => {
            let mut out = OutputWriter::new(writer, false, true);
            out.write(report)?;
            out.flush()?;
        }
        ReportFormat::JsonLines => {
            let mut out = OutputWriter::new(writer, true, false);
            out.write_all(&report.failures)?;
            out.flush()?;
        }
    }
    Ok(())
}

/// Write a report to `path`, creating parent directories.
pub fn write_report(path: &Path, report: &BatchReport, format: ReportFormat) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    write_report_to(BufWriter::new(file), report, format)?;
    tracing::info!(
        "Wrote {} failure(s) to {:?}",
        report.failures.len(),
        path
    );
    Ok(())
}

/// Read the failure rows of a previously written report.
pub fn read_failures(path: &Path, format: ReportFormat) -> Result<Vec<FailedFetch>> {
    let file = File::open(path)?;
    match format {
        ReportFormat::Csv => {
            let mut reader = csv::Reader::from_reader(file);
            let failures = reader
                .deserialize::<FailedFetch>()
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(failures)
        }
        ReportFormat::Json => {
            let report: BatchReport = serde_json::from_reader(BufReader::new(file))?;
            Ok(report.failures)
        }
        ReportFormat::JsonLines => {
            let mut failures = Vec::new();
            for line in BufReader::new(file).lines() {
                let line = line?;
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                failures.push(serde_json::from_str(line)?);
            }
            Ok(failures)
        }
    }
}
