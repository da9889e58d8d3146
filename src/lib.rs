//! dupstage - find duplicate files and stage the redundant copies
//!
//! Duplicates are found with a three-phase funnel: files are bucketed by
//! size, same-size files are compared by an xxh3 digest of their first
//! 8 KiB, and the survivors are confirmed with a full BLAKE3 digest. One
//! keeper per group stays in place; the other copies are moved into a
//! staging folder that mirrors the scanned tree (or only planned, in
//! dry-run mode). Every run that finds duplicates writes a CSV report.

pub mod actions;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::sync::Arc;

use anyhow::Context;
use bytesize::ByteSize;
use chrono::Local;

use crate::actions::{RelocateConfig, Relocator};
use crate::cli::Cli;
use crate::config::Config;
use crate::duplicates::{DuplicateFinder, FinderConfig, FinderError};
use crate::error::ExitCode;
use crate::output::CsvReport;
use crate::progress::{Progress, ProgressCallback};

/// Run one scan-and-stage pass as described by the parsed command line.
///
/// # Errors
///
/// Returns an error for fatal setup problems: invalid configuration, a
/// missing or non-directory source, an unopenable log file, or a report
/// that cannot be written. Per-file failures are logged and reported, never
/// returned.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    let started = Local::now();

    let config = Config::load(cli.config.as_deref(), cli.overrides())
        .context("failed to load configuration")?;
    config.validate()?;

    logging::init_logging(cli.verbose, cli.quiet, config.log_file.as_deref())
        .context("failed to open log file")?;

    let source = std::path::absolute(config.source_root()?)
        .context("cannot resolve source directory")?;
    let staging = std::path::absolute(config.staging_root()?)
        .context("cannot resolve staging directory")?;
    let dry_run = !cli.live;

    log::info!("{}", "=".repeat(60));
    log::info!(
        "Duplicate file stager  ({})",
        if dry_run { "DRY RUN" } else { "LIVE MODE" }
    );
    log::info!("  Source:   {}", source.display());
    log::info!("  Dest:     {}", staging.display());
    log::info!("  Min size: {}", ByteSize::b(config.min_size));
    log::info!("  Keep:     {}", config.keep);
    log::info!("{}", "=".repeat(60));
    log::debug!("Effective configuration: {config:?}");

    if staging.starts_with(&source) {
        log::warn!(
            "Staging folder {} is inside the scanned tree; staged files will be scanned on the next run",
            staging.display()
        );
    }

    let handler = signal::install_handler()?;
    let progress: Option<Arc<dyn ProgressCallback>> = if cli.quiet {
        None
    } else {
        Some(Arc::new(Progress::new(false)))
    };

    let mut finder_config = FinderConfig::default()
        .with_io_threads(config.io_threads)
        .with_strict(config.strict)
        .with_walker_config(config.walker_config())
        .with_shutdown_flag(handler.get_flag());
    if let Some(ref callback) = progress {
        finder_config = finder_config.with_progress_callback(Arc::clone(callback));
    }

    let (groups, summary) = match DuplicateFinder::new(finder_config).find_duplicates(&source) {
        Ok(found) => found,
        Err(FinderError::Interrupted) => {
            log::warn!("Scan interrupted before any file was moved; no report written");
            return Ok(ExitCode::Interrupted);
        }
        Err(e) => return Err(e).context(format!("scan of {} failed", source.display())),
    };

    if !summary.scan_errors.is_empty() {
        log::warn!(
            "{} file(s) or folder(s) could not be read and were skipped",
            summary.scan_errors.len()
        );
        for error in &summary.scan_errors {
            log::debug!("  {error}");
        }
    }

    if groups.is_empty() {
        log::info!("No duplicates found!");
        return Ok(ExitCode::Success);
    }

    log::info!(
        "Found {} duplicate groups ({} redundant files)",
        summary.duplicate_groups,
        summary.duplicate_files
    );
    log::info!(
        "Potential space savings: {} ({:.1}% of scanned data)",
        summary.reclaimable_display(),
        summary.wasted_percentage()
    );

    let mut relocate_config = RelocateConfig::new(&source, &staging)
        .with_dry_run(dry_run)
        .with_policy(config.keep)
        .with_shutdown_flag(handler.get_flag());
    if let Some(ref callback) = progress {
        relocate_config = relocate_config.with_progress_callback(Arc::clone(callback));
    }

    let report = Relocator::new(relocate_config).run(&groups);

    let path = CsvReport::new(&report.entries)
        .write_file(&config.report_dir, &started)
        .context("failed to write report")?;
    log::info!("Report saved to {}", path.display());

    if report.interrupted {
        Ok(ExitCode::Interrupted)
    } else {
        Ok(ExitCode::Success)
    }
}
