//! Report writers for relocation runs.
//!
//! # Example
//!
//! ```no_run
//! use dupstage::actions::{RelocateConfig, Relocator};
//! use dupstage::duplicates::DuplicateFinder;
//! use dupstage::output::CsvReport;
//! use std::path::Path;
//!
//! let finder = DuplicateFinder::with_defaults();
//! let (groups, _) = finder.find_duplicates(Path::new(".")).unwrap();
//! let report = Relocator::new(RelocateConfig::new(".", "/staging")).run(&groups);
//!
//! let path = CsvReport::new(&report.entries)
//!     .write_file(Path::new("."), &chrono::Local::now())
//!     .unwrap();
//! println!("Report saved to {}", path.display());
//! ```

pub mod csv;

pub use self::csv::{report_file_name, CsvReport, ReportError};
