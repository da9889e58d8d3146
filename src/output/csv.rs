//! CSV report of a relocation run.
//!
//! One row is written per plan entry, in plan order.
//!
//! # Columns
//!
//! - `group`: 1-based duplicate group id
//! - `action`: `KEEP`, `WOULD_MOVE`, `MOVED` or `ERROR`
//! - `original_path`: Where the file was found
//! - `destination`: Staging path; the failure reason for `ERROR` rows; empty for `KEEP`
//! - `size_bytes`: Size of the group's keeper
//!
//! # Example
//!
//! ```no_run
//! use dupstage::actions::PlanEntry;
//! use dupstage::output::csv::CsvReport;
//!
//! let entries: Vec<PlanEntry> = Vec::new();
//! let report = CsvReport::new(&entries);
//! report.write_to(std::io::stdout()).unwrap();
//! ```

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;

use crate::actions::{Action, PlanEntry};

/// Errors that can occur while writing the report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The report file or its directory could not be created.
    #[error("cannot write report {path}: {source}")]
    Create {
        /// Path that could not be created
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during CSV serialization.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A single row in the CSV output.
#[derive(Debug, Serialize)]
struct CsvRow {
    group: usize,
    action: &'static str,
    original_path: String,
    destination: String,
    size_bytes: u64,
}

impl From<&PlanEntry> for CsvRow {
    fn from(entry: &PlanEntry) -> Self {
        let destination = match entry.action {
            Action::Error => entry.reason.clone().unwrap_or_default(),
            _ => entry
                .destination
                .as_ref()
                .map(|d| d.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        Self {
            group: entry.group_id,
            action: entry.action.as_str(),
            original_path: entry.source.to_string_lossy().into_owned(),
            destination,
            size_bytes: entry.size,
        }
    }
}

/// Report file name for a run started at `started`.
///
/// ```
/// use chrono::{Local, TimeZone};
/// use dupstage::output::csv::report_file_name;
///
/// let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
/// assert_eq!(report_file_name(&at), "duplicate_report_20240309_140507.csv");
/// ```
#[must_use]
pub fn report_file_name(started: &DateTime<Local>) -> String {
    format!("duplicate_report_{}.csv", started.format("%Y%m%d_%H%M%S"))
}

/// CSV output formatter.
pub struct CsvReport<'a> {
    entries: &'a [PlanEntry],
}

impl<'a> CsvReport<'a> {
    /// Create a new CSV report over `entries`.
    #[must_use]
    pub fn new(entries: &'a [PlanEntry]) -> Self {
        Self { entries }
    }

    /// Write the CSV output to the given writer.
    ///
    /// The header is written even when there are no entries.
    ///
    /// # Errors
    ///
    /// Returns `ReportError` if writing or serialization fails.
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), ReportError> {
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);

        csv_writer.write_record([
            "group",
            "action",
            "original_path",
            "destination",
            "size_bytes",
        ])?;
        for entry in self.entries {
            csv_writer.serialize(CsvRow::from(entry))?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Write the report into `dir`, named after `started`.
    ///
    /// The directory is created if missing. Returns the path written.
    ///
    /// # Errors
    ///
    /// Returns `ReportError` if the directory or file cannot be created or written.
    pub fn write_file(
        &self,
        dir: &Path,
        started: &DateTime<Local>,
    ) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(dir).map_err(|e| ReportError::Create {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let path = dir.join(report_file_name(started));
        let file = File::create(&path).map_err(|e| ReportError::Create {
            path: path.clone(),
            source: e,
        })?;
        self.write_to(io::BufWriter::new(file))?;
        Ok(path)
    }

    /// Generate CSV output as a string.
    ///
    /// # Errors
    ///
    /// Returns `ReportError` if serialization fails.
    pub fn to_string(&self) -> Result<String, ReportError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}
