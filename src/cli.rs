//! Command-line interface definitions for dupstage.
//!
//! Flags override the config file and `DUPSTAGE_*` environment variables.
//!
//! # Example
//!
//! ```bash
//! # Dry run: report what would be moved
//! dupstage --source /data --dest /mnt/staging
//!
//! # Move duplicates of at least 1 MiB, keeping the oldest copy
//! dupstage --source /data --dest /mnt/staging --min-size 1MiB --keep oldest --move
//!
//! # Verbose mode for debugging
//! dupstage -v --source /data --dest /mnt/staging
//! ```

use clap::Parser;
use std::path::PathBuf;

use crate::config::Overrides;
use crate::duplicates::KeeperPolicy;

/// Find duplicate files and move redundant copies to a staging folder.
///
/// Runs as a dry run unless --move is given. Every run writes a CSV report
/// listing the kept file and the planned or performed move for each copy.
#[derive(Debug, Parser)]
#[command(name = "dupstage")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Root folder to scan
    #[arg(long, value_name = "PATH")]
    pub source: Option<PathBuf>,

    /// Staging folder that receives redundant copies
    #[arg(long, value_name = "PATH")]
    pub dest: Option<PathBuf>,

    /// Folder for the CSV report (default: current directory)
    #[arg(long, value_name = "PATH")]
    pub report_dir: Option<PathBuf>,

    /// Minimum file size to consider (e.g., 1KB, 1MB, 1GB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Actually move files (default is dry-run)
    #[arg(long = "move")]
    pub live: bool,

    /// Additional directory name to skip (can be specified multiple times)
    #[arg(long = "skip-dir", value_name = "NAME")]
    pub skip_dirs: Vec<String>,

    /// Which copy to keep in each duplicate group
    #[arg(long, value_enum, value_name = "POLICY")]
    pub keep: Option<KeeperPolicy>,

    /// Number of I/O threads for hashing (default: 4)
    ///
    /// Lower values reduce disk thrashing on HDDs.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub io_threads: Option<u64>,

    /// Log a progress line every N files (default: 10000)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub progress_interval: Option<u64>,

    /// Abort on the first unreadable file instead of skipping it
    #[arg(long)]
    pub strict: bool,

    /// Follow symbolic links during scan
    ///
    /// Warning: a followed link makes its target appear twice.
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Config file (default: config.toml in the platform config directory)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Also append log lines to this file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    /// Flags that take part in config layering.
    #[must_use]
    pub fn overrides(&self) -> Overrides {
        Overrides {
            source: self.source.clone(),
            dest: self.dest.clone(),
            report_dir: self.report_dir.clone(),
            min_size: self.min_size,
            keep: self.keep,
            io_threads: self.io_threads.map(|n| n as usize),
            progress_interval: self.progress_interval.map(|n| n as usize),
            follow_symlinks: self.follow_symlinks.then_some(true),
            strict: self.strict.then_some(true),
            log_file: self.log_file.clone(),
            extra_skip_dirs: self.skip_dirs.clone(),
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// Decimal suffixes (KB, MB, ...) are powers of 1000, binary ones (KiB,
/// MiB, ...) powers of 1024. Suffixes are case-insensitive.
///
/// # Example
///
/// ```
/// use dupstage::cli::parse_size;
///
/// assert_eq!(parse_size("1KiB").unwrap(), 1024);
/// assert_eq!(parse_size("1.5MB").unwrap(), 1_500_000);
/// ```
///
/// # Errors
///
/// Returns an error message if the number or suffix is not understood.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1 << 10,
        "MB" | "M" => 1_000_000,
        "MIB" => 1 << 20,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1 << 30,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1 << 40,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
