//! Relocation of redundant copies into a staging area.
//!
//! # Overview
//!
//! For every duplicate group the relocator:
//! - Re-checks that the keeper is still accessible (the group is skipped otherwise)
//! - Emits one `KEEP` entry for the keeper
//! - Emits one `WOULD_MOVE`, `MOVED` or `ERROR` entry per mover
//!
//! Destinations mirror each mover's path relative to the scan root under the
//! staging root, so staged files can be restored by moving them back.
//!
//! # Safety
//!
//! - Dry-run is the default; nothing on disk changes unless it is turned off
//! - A mover whose size changed since the scan is not moved
//! - An existing destination is never overwritten
//! - A failure on one mover never stops the others
//!
//! # Example
//!
//! ```no_run
//! use dupstage::actions::relocate::{RelocateConfig, Relocator};
//! use dupstage::duplicates::DuplicateGroup;
//!
//! let groups: Vec<DuplicateGroup> = Vec::new();
//! let config = RelocateConfig::new("/data", "/staging");
//! let report = Relocator::new(config).run(&groups);
//! println!("{} entries", report.entries.len());
//! ```

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytesize::ByteSize;
use thiserror::Error;

use crate::duplicates::{select_keeper, DuplicateGroup, KeeperPolicy};
use crate::progress::{ProgressCallback, PHASE_RELOCATE};

/// Error type for a single relocation.
#[derive(Debug, Error)]
pub enum RelocateError {
    /// File was not found (may have been deleted or moved).
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// Permission denied when reading or moving the file.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// File size changed between the scan and the move.
    #[error("modified since scan: {path} (size {expected} → {actual})")]
    Modified {
        /// File that changed
        path: PathBuf,
        /// Size at scan time
        expected: u64,
        /// Size now
        actual: u64,
    },

    /// Something already occupies the destination path.
    #[error("destination already exists: {0}")]
    DestinationExists(PathBuf),

    /// The destination directory could not be created.
    #[error("cannot create directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// General I/O error.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl RelocateError {
    fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}

/// What happened (or would happen) to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Retained in place
    Keep,
    /// Would be moved in live mode
    WouldMove,
    /// Moved to the staging area
    Moved,
    /// Move attempted and failed
    Error,
}

impl Action {
    /// Report label for this action.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Keep => "KEEP",
            Self::WouldMove => "WOULD_MOVE",
            Self::Moved => "MOVED",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the relocation plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    /// 1-based id of the duplicate group
    pub group_id: usize,
    /// Outcome for this file
    pub action: Action,
    /// Original location
    pub source: PathBuf,
    /// Staging location (absent for keepers)
    pub destination: Option<PathBuf>,
    /// Size of the keeper at relocation time
    pub size: u64,
    /// Failure reason for `ERROR` entries
    pub reason: Option<String>,
}

impl PlanEntry {
    fn new(group_id: usize, action: Action, source: &Path, size: u64) -> Self {
        Self {
            group_id,
            action,
            source: source.to_path_buf(),
            destination: None,
            size,
            reason: None,
        }
    }

    fn to(mut self, destination: PathBuf) -> Self {
        self.destination = Some(destination);
        self
    }
}

/// Size observed right before acting on a file.
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    /// Path to the file.
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
}

impl FileSnapshot {
    /// Stat a file.
    ///
    /// # Errors
    ///
    /// Returns error if file doesn't exist or can't be accessed.
    pub fn capture(path: &Path) -> Result<Self, RelocateError> {
        let metadata = fs::metadata(path).map_err(|e| RelocateError::from_io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            size: metadata.len(),
        })
    }

    /// Check that the file still has the expected size.
    ///
    /// # Errors
    ///
    /// Returns `Modified` if the size differs, or the stat error.
    pub fn verify_size(path: &Path, expected: u64) -> Result<Self, RelocateError> {
        let current = Self::capture(path)?;
        if current.size != expected {
            log::warn!(
                "File modified since scan: {} (size changed from {} to {})",
                path.display(),
                expected,
                current.size
            );
            return Err(RelocateError::Modified {
                path: path.to_path_buf(),
                expected,
                actual: current.size,
            });
        }
        Ok(current)
    }
}

/// Compute where a mover goes inside the staging area.
///
/// The path relative to `scan_root` is recreated under `staging_root`. Paths
/// outside the scan root keep their normal components only (drive prefixes
/// and the root are dropped).
///
/// # Example
///
/// ```
/// use dupstage::actions::relocate::staging_destination;
/// use std::path::Path;
///
/// let dest = staging_destination(
///     Path::new("/data/photos/2019/img.jpg"),
///     Path::new("/data"),
///     Path::new("/staging"),
/// );
/// assert_eq!(dest, Path::new("/staging/photos/2019/img.jpg"));
/// ```
#[must_use]
pub fn staging_destination(source: &Path, scan_root: &Path, staging_root: &Path) -> PathBuf {
    match source.strip_prefix(scan_root) {
        Ok(relative) => staging_root.join(relative),
        Err(_) => {
            let relative: PathBuf = source
                .components()
                .filter(|c| matches!(c, Component::Normal(_)))
                .collect();
            staging_root.join(relative)
        }
    }
}

/// Performs the filesystem part of a relocation.
pub trait Mover: Send + Sync {
    /// Move `source` to `destination`.
    ///
    /// # Errors
    ///
    /// Returns a `RelocateError` describing why the move did not happen.
    fn relocate(&self, source: &Path, destination: &Path) -> Result<(), RelocateError>;
}

/// Mover that renames within a filesystem and copies across filesystems.
///
/// An existing destination is refused. The check happens before the rename,
/// and on Unix `rename` replaces its target, so a file created at the
/// destination by another process in between is overwritten. The staging
/// tree is assumed to have no concurrent writers.
#[derive(Debug, Clone, Copy, Default)]
pub struct StagingMover;

impl StagingMover {
    /// Prepare the destination, then move with `rename`, copying instead
    /// when `rename` reports that the paths are on different filesystems.
    fn move_with<R>(source: &Path, destination: &Path, rename: R) -> Result<(), RelocateError>
    where
        R: FnOnce(&Path, &Path) -> io::Result<()>,
    {
        if fs::symlink_metadata(destination).is_ok() {
            return Err(RelocateError::DestinationExists(destination.to_path_buf()));
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| RelocateError::CreateDir {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        match rename(source, destination) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                log::debug!(
                    "Rename crosses filesystems, copying instead: {}",
                    source.display()
                );
                Self::copy_then_remove(source, destination)
            }
            Err(e) => Err(RelocateError::from_io(source, e)),
        }
    }

    fn copy_then_remove(source: &Path, destination: &Path) -> Result<(), RelocateError> {
        fs::copy(source, destination).map_err(|e| RelocateError::from_io(source, e))?;
        if let Err(e) = fs::remove_file(source) {
            // Leave exactly one copy behind.
            if let Err(cleanup) = fs::remove_file(destination) {
                log::warn!(
                    "Failed to remove partial copy {}: {}",
                    destination.display(),
                    cleanup
                );
            }
            return Err(RelocateError::from_io(source, e));
        }
        Ok(())
    }
}

impl Mover for StagingMover {
    fn relocate(&self, source: &Path, destination: &Path) -> Result<(), RelocateError> {
        Self::move_with(source, destination, |from, to| fs::rename(from, to))
    }
}

/// Configuration for a relocation run.
#[derive(Clone)]
pub struct RelocateConfig {
    /// Root the scan started from; destinations mirror paths relative to it.
    pub scan_root: PathBuf,
    /// Root of the staging area.
    pub staging_root: PathBuf,
    /// Only plan, never touch the filesystem (default).
    pub dry_run: bool,
    /// Rule for picking the keeper.
    pub policy: KeeperPolicy,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for RelocateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelocateConfig")
            .field("scan_root", &self.scan_root)
            .field("staging_root", &self.staging_root)
            .field("dry_run", &self.dry_run)
            .field("policy", &self.policy)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl RelocateConfig {
    /// Dry-run configuration with the default keeper policy.
    #[must_use]
    pub fn new(scan_root: impl Into<PathBuf>, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            scan_root: scan_root.into(),
            staging_root: staging_root.into(),
            dry_run: true,
            policy: KeeperPolicy::default(),
            shutdown_flag: None,
            progress_callback: None,
        }
    }

    /// Enable/disable dry-run.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the keeper policy.
    #[must_use]
    pub fn with_policy(mut self, policy: KeeperPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Totals of a relocation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationSummary {
    /// Groups that produced a `KEEP` entry
    pub groups_processed: usize,
    /// Groups skipped because the keeper was inaccessible
    pub groups_skipped: usize,
    /// Files moved to the staging area
    pub moved: usize,
    /// Files that would be moved (dry-run)
    pub would_move: usize,
    /// Moves that failed
    pub failed: usize,
    /// Bytes removed from the scanned tree
    pub bytes_freed: u64,
    /// Bytes a live run would remove (dry-run)
    pub bytes_reclaimable: u64,
}

impl RelocationSummary {
    /// Human-readable summary of the run.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.would_move > 0 {
            format!(
                "Would move {} file(s), ~{} reclaimable",
                self.would_move,
                ByteSize::b(self.bytes_reclaimable)
            )
        } else if self.failed == 0 {
            format!(
                "Moved {} file(s), freed ~{}",
                self.moved,
                ByteSize::b(self.bytes_freed)
            )
        } else {
            format!(
                "Moved {} file(s), {} failed, freed ~{}",
                self.moved,
                self.failed,
                ByteSize::b(self.bytes_freed)
            )
        }
    }
}

/// Everything a relocation run produced.
#[derive(Debug, Clone, Default)]
pub struct RelocationReport {
    /// Plan entries in group order, keeper first within each group
    pub entries: Vec<PlanEntry>,
    /// Totals
    pub summary: RelocationSummary,
    /// Whether the run stopped early on a shutdown request
    pub interrupted: bool,
}

/// Walks duplicate groups and stages their redundant copies.
pub struct Relocator {
    config: RelocateConfig,
    mover: Box<dyn Mover>,
}

impl Relocator {
    /// Create a relocator that moves files on disk.
    #[must_use]
    pub fn new(config: RelocateConfig) -> Self {
        Self::with_mover(config, Box::new(StagingMover))
    }

    /// Create a relocator with a custom mover.
    #[must_use]
    pub fn with_mover(config: RelocateConfig, mover: Box<dyn Mover>) -> Self {
        Self { config, mover }
    }

    /// Process `groups` in order. Group ids are 1-based positions in `groups`.
    ///
    /// Shutdown is checked before each group. A group that has started is
    /// finished, so the entries never hold part of a group.
    #[must_use]
    pub fn run(&self, groups: &[DuplicateGroup]) -> RelocationReport {
        let mut report = RelocationReport::default();
        let total_movers: usize = groups.iter().map(DuplicateGroup::duplicate_count).sum();
        let mut processed = 0usize;

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(PHASE_RELOCATE, total_movers);
        }

        for (index, group) in groups.iter().enumerate() {
            let group_id = index + 1;

            if self.config.is_shutdown_requested() {
                report.interrupted = true;
                break;
            }

            let Some((keeper, movers)) = select_keeper(group, self.config.policy) else {
                continue;
            };
            if let Some(ref callback) = self.config.progress_callback {
                callback.on_message(&format!("Group {}/{}", group_id, groups.len()));
            }

            let size = match FileSnapshot::capture(&keeper.path) {
                Ok(snapshot) => snapshot.size,
                Err(e) => {
                    log::debug!(
                        "  Skipping group {}: cannot access {} ({})",
                        group_id,
                        keeper.path.display(),
                        e
                    );
                    report.summary.groups_skipped += 1;
                    processed += movers.len();
                    continue;
                }
            };

            report
                .entries
                .push(PlanEntry::new(group_id, Action::Keep, &keeper.path, size));
            report.summary.groups_processed += 1;

            // Shutdown is only honored between groups, so every group in
            // the report has its KEEP row and all of its mover rows.
            for mover in movers {
                processed += 1;
                if let Some(ref callback) = self.config.progress_callback {
                    callback.on_progress(processed, mover.path.to_string_lossy().as_ref());
                }

                let destination = staging_destination(
                    &mover.path,
                    &self.config.scan_root,
                    &self.config.staging_root,
                );
                let entry = self.relocate_one(
                    group_id,
                    &mover.path,
                    destination,
                    size,
                    &mut report.summary,
                );
                report.entries.push(entry);
            }
        }

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(PHASE_RELOCATE);
        }

        if report.interrupted {
            log::info!("Relocation interrupted by shutdown signal");
        }
        log::info!(
            "{}{}",
            if self.config.dry_run { "[DRY RUN] " } else { "" },
            report.summary.summary()
        );

        report
    }

    fn relocate_one(
        &self,
        group_id: usize,
        source: &Path,
        destination: PathBuf,
        size: u64,
        summary: &mut RelocationSummary,
    ) -> PlanEntry {
        if self.config.dry_run {
            log::debug!("  [DRY RUN] {}  →  {}", source.display(), destination.display());
            summary.would_move += 1;
            summary.bytes_reclaimable += size;
            return PlanEntry::new(group_id, Action::WouldMove, source, size).to(destination);
        }

        let result = FileSnapshot::verify_size(source, size)
            .and_then(|_| self.mover.relocate(source, &destination));

        match result {
            Ok(()) => {
                log::debug!("  Moved {}  →  {}", source.display(), destination.display());
                summary.moved += 1;
                summary.bytes_freed += size;
                PlanEntry::new(group_id, Action::Moved, source, size).to(destination)
            }
            Err(e) => {
                log::warn!("  Could not move {}: {}", source.display(), e);
                summary.failed += 1;
                let mut entry =
                    PlanEntry::new(group_id, Action::Error, source, size).to(destination);
                entry.reason = Some(e.to_string());
                entry
            }
        }
    }
}
