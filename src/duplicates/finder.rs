//! Duplicate finder implementation with multi-phase detection.
//!
//! # Overview
//!
//! This module orchestrates the duplicate detection pipeline:
//! 1. **Phase 1 - Size grouping**: Group files by size (see [`crate::duplicates::groups`] module)
//! 2. **Phase 2 - Prehash**: Digest the first 8 KiB of same-size files
//! 3. **Phase 3 - Full hash**: Hash entire content of prehash matches
//!
//! Grouping in phases 2 and 3 is always keyed by size as well as digest, so
//! files from different size buckets never meet.
//!
//! # Example
//!
//! ```no_run
//! use dupstage::scanner::{Walker, WalkerConfig, Hasher};
//! use dupstage::duplicates::{bucket_by_size, resolve, FinderConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("."), WalkerConfig::default());
//! let (buckets, _) = bucket_by_size(&walker, 1);
//!
//! let (groups, stats) = resolve(buckets, &Hasher::new(), &FinderConfig::default());
//! println!("{} groups, {} bytes hashed", groups.len(), stats.fullhash.bytes_hashed);
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytesize::ByteSize;
use rayon::prelude::*;

use super::groups::{bucket_by_size, DuplicateGroup, SizeBuckets};
use crate::progress::{ProgressCallback, PHASE_FULLHASH, PHASE_PREHASH, PHASE_WALK};
use crate::scanner::{
    FileRecord, FileSource, Fingerprinter, Hash, HashError, Hasher, PartialHash, ScanError,
    Walker, WalkerConfig,
};

/// Files within one size bucket sharing a prefix digest.
#[derive(Debug, Clone)]
pub struct PartialBucket {
    /// Size shared by all members
    pub size: u64,
    /// Prefix digest shared by all members
    pub prehash: PartialHash,
    /// Members, in discovery order
    pub files: Vec<FileRecord>,
}

/// Result of hashing one file in a parallel phase.
enum Hashed<T> {
    Done(FileRecord, T),
    Failed(HashError),
    Skipped,
}

/// Run `f` on a dedicated pool of `threads` workers.
///
/// Falls back to the global pool if the dedicated one cannot be built.
fn run_in_pool<R, F>(threads: usize, f: F) -> R
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(f),
        Err(e) => {
            log::warn!(
                "Failed to create I/O thread pool ({}), using global pool with {} threads",
                e,
                rayon::current_num_threads()
            );
            f()
        }
    }
}

/// Hash `files` in parallel, checking for shutdown before every file.
fn hash_all<T, F>(
    files: Vec<FileRecord>,
    config: &FinderConfig,
    hash: F,
) -> Vec<Hashed<T>>
where
    T: Send,
    F: Fn(&Path) -> Result<T, HashError> + Sync,
{
    let processed = AtomicUsize::new(0);

    run_in_pool(config.io_threads, || {
        files
            .into_par_iter()
            .map(|file| {
                if config.is_shutdown_requested() {
                    return Hashed::Skipped;
                }

                let current = processed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(ref callback) = config.progress_callback {
                    callback.on_progress(current, file.path.to_string_lossy().as_ref());
                }

                match hash(&file.path) {
                    Ok(digest) => Hashed::Done(file, digest),
                    Err(HashError::Interrupted(_)) => Hashed::Skipped,
                    Err(e) => {
                        log::warn!("Failed to hash {}: {}", file.path.display(), e);
                        Hashed::Failed(e)
                    }
                }
            })
            .collect()
    })
}

/// Statistics from prehash phase.
#[derive(Debug, Default)]
pub struct PrehashStats {
    /// Total files that entered Phase 2
    pub input_files: usize,
    /// Number of files successfully hashed
    pub hashed_files: usize,
    /// Number of files that failed to hash (I/O errors)
    pub failed_files: usize,
    /// Errors encountered during prehash
    pub errors: Vec<HashError>,
    /// Files whose prefix digest matched nothing else in their bucket
    pub unique_prehashes: usize,
    /// Number of files that could still be duplicates
    pub potential_duplicates: usize,
    /// Number of partial buckets with 2+ files
    pub candidate_buckets: usize,
    /// Whether phase was interrupted by shutdown
    pub interrupted: bool,
}

impl PrehashStats {
    /// Percentage of files eliminated by prehash comparison.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        if self.input_files == 0 {
            0.0
        } else {
            let eliminated = self.input_files - self.potential_duplicates;
            (eliminated as f64 / self.input_files as f64) * 100.0
        }
    }
}

/// Group same-size files by prefix digest (Phase 2).
///
/// Buckets with fewer than two members are dropped before any I/O. Files that
/// fail to hash are excluded and recorded in the stats. Only partial buckets
/// with two or more members are returned.
#[must_use]
pub fn phase2_prehash<F>(
    buckets: SizeBuckets,
    fingerprinter: &F,
    config: &FinderConfig,
) -> (Vec<PartialBucket>, PrehashStats)
where
    F: Fingerprinter + ?Sized,
{
    let files: Vec<FileRecord> = buckets
        .into_values()
        .filter(|files| files.len() > 1)
        .flatten()
        .collect();

    let mut stats = PrehashStats {
        input_files: files.len(),
        ..Default::default()
    };

    if files.is_empty() {
        log::debug!("Phase 2: No files to process");
        return (Vec::new(), stats);
    }

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_start(PHASE_PREHASH, files.len());
    }
    log::info!("Phase 2: Computing prehashes for {} files", files.len());

    let results = hash_all(files, config, |path| fingerprinter.prehash(path));

    let mut grouped: HashMap<(u64, PartialHash), Vec<FileRecord>> = HashMap::new();
    for result in results {
        match result {
            Hashed::Done(file, prehash) => {
                stats.hashed_files += 1;
                grouped.entry((file.size, prehash)).or_default().push(file);
            }
            Hashed::Failed(e) => {
                stats.failed_files += 1;
                stats.errors.push(e);
            }
            Hashed::Skipped => stats.interrupted = true,
        }
    }

    if stats.interrupted || config.is_shutdown_requested() {
        stats.interrupted = true;
        log::info!("Phase 2: Interrupted by shutdown signal");
    }

    let mut partial_buckets = Vec::new();
    for ((size, prehash), files) in grouped {
        if files.len() < 2 {
            stats.unique_prehashes += files.len();
            continue;
        }
        log::trace!(
            "Prehash bucket {:032x} ({} bytes): {} candidates",
            prehash,
            size,
            files.len()
        );
        stats.potential_duplicates += files.len();
        stats.candidate_buckets += 1;
        partial_buckets.push(PartialBucket {
            size,
            prehash,
            files,
        });
    }

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_end(PHASE_PREHASH);
    }

    log::info!(
        "Phase 2 complete: {} files → {} potential duplicates ({:.1}% eliminated)",
        stats.input_files,
        stats.potential_duplicates,
        stats.elimination_rate()
    );

    (partial_buckets, stats)
}

/// Statistics from full hash phase.
#[derive(Debug, Default)]
pub struct FullhashStats {
    /// Total files that entered Phase 3
    pub input_files: usize,
    /// Number of files successfully hashed
    pub hashed_files: usize,
    /// Number of files that failed to hash (I/O errors)
    pub failed_files: usize,
    /// Errors encountered during full hashing
    pub errors: Vec<HashError>,
    /// Total bytes read while hashing
    pub bytes_hashed: u64,
    /// Number of confirmed duplicate groups
    pub duplicate_groups: usize,
    /// Number of redundant copies across all groups
    pub duplicate_files: usize,
    /// Space held by redundant copies
    pub wasted_space: u64,
    /// Whether phase was interrupted by shutdown
    pub interrupted: bool,
}

/// Confirm duplicates by full content hash (Phase 3).
///
/// Every file in `partial_buckets` is hashed exactly once. Groups are
/// returned sorted by size (largest first), then by their smallest member
/// path; members are sorted by path and carry their fingerprint.
#[must_use]
pub fn phase3_fullhash<F>(
    partial_buckets: Vec<PartialBucket>,
    fingerprinter: &F,
    config: &FinderConfig,
) -> (Vec<DuplicateGroup>, FullhashStats)
where
    F: Fingerprinter + ?Sized,
{
    let files: Vec<FileRecord> = partial_buckets
        .into_iter()
        .filter(|bucket| bucket.files.len() > 1)
        .flat_map(|bucket| bucket.files)
        .collect();

    let mut stats = FullhashStats {
        input_files: files.len(),
        ..Default::default()
    };

    if files.is_empty() {
        log::debug!("Phase 3: No files to process");
        return (Vec::new(), stats);
    }

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_start(PHASE_FULLHASH, files.len());
    }
    log::info!("Phase 3: Computing full hashes for {} files", files.len());

    let results = hash_all(files, config, |path| fingerprinter.full_hash(path));

    let mut grouped: HashMap<(u64, Hash), Vec<FileRecord>> = HashMap::new();
    for result in results {
        match result {
            Hashed::Done(mut file, hash) => {
                stats.hashed_files += 1;
                stats.bytes_hashed += file.size;
                file.fingerprint = Some(hash);
                grouped.entry((file.size, hash)).or_default().push(file);
            }
            Hashed::Failed(e) => {
                stats.failed_files += 1;
                stats.errors.push(e);
            }
            Hashed::Skipped => stats.interrupted = true,
        }
    }

    if stats.interrupted || config.is_shutdown_requested() {
        stats.interrupted = true;
        log::info!("Phase 3: Interrupted by shutdown signal");
    }

    let mut groups: Vec<DuplicateGroup> = grouped
        .into_iter()
        .filter(|(_, files)| files.len() > 1)
        .map(|((size, hash), mut files)| {
            files.sort_by(|a, b| a.path.cmp(&b.path));
            DuplicateGroup::new(hash, size, files)
        })
        .collect();

    groups.sort_by(|a, b| {
        b.size
            .cmp(&a.size)
            .then_with(|| a.files[0].path.cmp(&b.files[0].path))
    });

    stats.duplicate_groups = groups.len();
    stats.duplicate_files = groups.iter().map(DuplicateGroup::duplicate_count).sum();
    stats.wasted_space = groups.iter().map(DuplicateGroup::wasted_space).sum();

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_end(PHASE_FULLHASH);
    }

    log::info!(
        "Phase 3 complete: {} duplicate groups, {} redundant files, {} hashed",
        stats.duplicate_groups,
        stats.duplicate_files,
        ByteSize::b(stats.bytes_hashed)
    );

    (groups, stats)
}

/// Combined statistics of phases 2 and 3.
#[derive(Debug, Default)]
pub struct ResolveStats {
    /// Prefix digest phase
    pub prehash: PrehashStats,
    /// Full digest phase
    pub fullhash: FullhashStats,
}

impl ResolveStats {
    /// Whether either phase stopped early on a shutdown request.
    #[must_use]
    pub fn interrupted(&self) -> bool {
        self.prehash.interrupted || self.fullhash.interrupted
    }

    /// Number of files that could not be hashed in either phase.
    #[must_use]
    pub fn failed_files(&self) -> usize {
        self.prehash.failed_files + self.fullhash.failed_files
    }
}

/// Turn size buckets into verified duplicate groups (phases 2 and 3).
///
/// A full hash is computed at most once per file and only for files that
/// share both size and prefix digest with another file. A failure on one
/// file only removes that file from consideration.
#[must_use]
pub fn resolve<F>(
    buckets: SizeBuckets,
    fingerprinter: &F,
    config: &FinderConfig,
) -> (Vec<DuplicateGroup>, ResolveStats)
where
    F: Fingerprinter + ?Sized,
{
    let (partial_buckets, prehash) = phase2_prehash(buckets, fingerprinter, config);
    if prehash.interrupted {
        let stats = ResolveStats {
            prehash,
            fullhash: FullhashStats::default(),
        };
        return (Vec::new(), stats);
    }

    let (groups, fullhash) = phase3_fullhash(partial_buckets, fingerprinter, config);
    (groups, ResolveStats { prehash, fullhash })
}

// ============================================================================
// DuplicateFinder - Pipeline Orchestrator
// ============================================================================

/// Configuration for the duplicate finder.
///
/// Controls the behavior of the multi-phase duplicate detection pipeline.
#[derive(Clone)]
pub struct FinderConfig {
    /// Number of I/O threads for parallel hashing.
    /// Default is 4 to prevent disk thrashing.
    pub io_threads: usize,
    /// Fail-fast on the first unreadable entry or file.
    pub strict: bool,
    /// Walker configuration for directory traversal.
    pub walker_config: WalkerConfig,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback for reporting.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for FinderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinderConfig")
            .field("io_threads", &self.io_threads)
            .field("strict", &self.strict)
            .field("walker_config", &self.walker_config)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            io_threads: 4,
            strict: false,
            walker_config: WalkerConfig::default(),
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl FinderConfig {
    /// Create a new configuration with custom I/O thread count.
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set fail-fast on any error.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the walker configuration.
    #[must_use]
    pub fn with_walker_config(mut self, config: WalkerConfig) -> Self {
        self.walker_config = config;
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

    /// Check if shutdown has been requested.
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Summary statistics from a duplicate scan.
#[derive(Debug, Default)]
pub struct ScanSummary {
    /// Total number of files scanned
    pub total_files: usize,
    /// Total size of all scanned files in bytes
    pub total_size: u64,
    /// Number of files eliminated by size grouping (unique sizes)
    pub eliminated_by_size: usize,
    /// Number of files eliminated by prehash (different first 8 KiB)
    pub eliminated_by_prehash: usize,
    /// Bytes read during full hashing
    pub bytes_hashed: u64,
    /// Number of confirmed duplicate groups
    pub duplicate_groups: usize,
    /// Total number of duplicate files (excluding keepers)
    pub duplicate_files: usize,
    /// Total space that can be reclaimed by relocating duplicates
    pub reclaimable_space: u64,
    /// Duration of the entire scan
    pub scan_duration: Duration,
    /// Errors encountered during the scan
    pub scan_errors: Vec<ScanError>,
}

impl ScanSummary {
    /// Calculate the percentage of space that is wasted by duplicates.
    #[must_use]
    pub fn wasted_percentage(&self) -> f64 {
        if self.total_size == 0 {
            0.0
        } else {
            (self.reclaimable_space as f64 / self.total_size as f64) * 100.0
        }
    }

    /// Format reclaimable space as human-readable string.
    #[must_use]
    pub fn reclaimable_display(&self) -> String {
        ByteSize::b(self.reclaimable_space).to_string()
    }

    /// Format total size as human-readable string.
    #[must_use]
    pub fn total_size_display(&self) -> String {
        ByteSize::b(self.total_size).to_string()
    }
}

/// Errors that can occur during duplicate finding.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// The scan was interrupted by user (Ctrl+C or shutdown signal).
    #[error("Scan interrupted by user")]
    Interrupted,

    /// The provided path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(std::path::PathBuf),

    /// The provided path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(std::path::PathBuf),

    /// A scan error occurred while running in strict mode.
    #[error(transparent)]
    ScanError(#[from] ScanError),
}

/// Duplicate finder that orchestrates the multi-phase detection pipeline.
///
/// # Example
///
/// ```no_run
/// use dupstage::duplicates::{DuplicateFinder, FinderConfig};
/// use std::path::Path;
///
/// let config = FinderConfig::default().with_io_threads(4);
/// let finder = DuplicateFinder::new(config);
///
/// let (groups, summary) = finder.find_duplicates(Path::new("/some/path")).unwrap();
///
/// println!("Found {} duplicate groups", summary.duplicate_groups);
/// println!("Reclaimable space: {}", summary.reclaimable_display());
/// ```
pub struct DuplicateFinder {
    config: FinderConfig,
    fingerprinter: Arc<dyn Fingerprinter>,
}

impl DuplicateFinder {
    /// Create a new duplicate finder that reads files from disk.
    #[must_use]
    pub fn new(config: FinderConfig) -> Self {
        let mut hasher = Hasher::new();
        if let Some(ref flag) = config.shutdown_flag {
            hasher = hasher.with_shutdown_flag(flag.clone());
        }
        Self::with_fingerprinter(config, Arc::new(hasher))
    }

    /// Create a finder with a custom fingerprint source.
    #[must_use]
    pub fn with_fingerprinter(config: FinderConfig, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        Self {
            config,
            fingerprinter,
        }
    }

    /// Create a new duplicate finder with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(FinderConfig::default())
    }

    /// Find all duplicate files starting from the given path.
    ///
    /// # Errors
    ///
    /// Returns `FinderError` if:
    /// - The path does not exist
    /// - The path is not a directory
    /// - The scan is interrupted by shutdown signal
    /// - Any entry or file fails while `strict` is set
    pub fn find_duplicates(
        &self,
        path: &Path,
    ) -> Result<(Vec<DuplicateGroup>, ScanSummary), FinderError> {
        if !path.exists() {
            return Err(FinderError::PathNotFound(path.to_path_buf()));
        }
        if !path.is_dir() {
            return Err(FinderError::NotADirectory(path.to_path_buf()));
        }

        // Records carry absolute paths whatever form the root was given in.
        let root = std::path::absolute(path).map_err(|e| ScanError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        log::info!("Starting duplicate scan of {}", root.display());

        let mut walker = Walker::new(&root, self.config.walker_config.clone());
        if let Some(ref flag) = self.config.shutdown_flag {
            walker = walker.with_shutdown_flag(flag.clone());
        }
        if let Some(ref callback) = self.config.progress_callback {
            walker = walker.with_progress_callback(callback.clone());
        }

        self.find_duplicates_from_source(&walker)
    }

    /// Find duplicates among the records produced by any [`FileSource`].
    ///
    /// # Errors
    ///
    /// Same as [`DuplicateFinder::find_duplicates`], minus the path checks.
    pub fn find_duplicates_from_source<S>(
        &self,
        source: &S,
    ) -> Result<(Vec<DuplicateGroup>, ScanSummary), FinderError>
    where
        S: FileSource + ?Sized,
    {
        let start_time = Instant::now();
        let mut summary = ScanSummary::default();

        if self.config.is_shutdown_requested() {
            return Err(FinderError::Interrupted);
        }

        // Phase 1: walk and bucket by size
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(PHASE_WALK, 0);
        }
        let (buckets, size_stats) = bucket_by_size(source, self.config.walker_config.min_size);
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(PHASE_WALK);
        }

        summary.total_files = size_stats.total_files;
        summary.total_size = size_stats.total_size;
        summary.eliminated_by_size = size_stats.eliminated_unique;

        log::info!(
            "Found {} files ({} total)",
            summary.total_files,
            summary.total_size_display()
        );

        if self.config.strict {
            if let Some(e) = size_stats.errors.into_iter().next() {
                return Err(FinderError::ScanError(e));
            }
        } else {
            summary.scan_errors.extend(size_stats.errors);
        }

        if self.config.is_shutdown_requested() {
            return Err(FinderError::Interrupted);
        }

        // Phases 2 and 3
        let (groups, stats) = resolve(buckets, self.fingerprinter.as_ref(), &self.config);

        if stats.interrupted() || self.config.is_shutdown_requested() {
            return Err(FinderError::Interrupted);
        }

        let hash_errors = stats
            .prehash
            .errors
            .into_iter()
            .chain(stats.fullhash.errors)
            .map(ScanError::from);
        if self.config.strict {
            if let Some(e) = hash_errors.into_iter().next() {
                return Err(FinderError::ScanError(e));
            }
        } else {
            summary.scan_errors.extend(hash_errors);
        }

        summary.eliminated_by_prehash = stats.prehash.unique_prehashes;
        summary.bytes_hashed = stats.fullhash.bytes_hashed;
        summary.duplicate_groups = stats.fullhash.duplicate_groups;
        summary.duplicate_files = stats.fullhash.duplicate_files;
        summary.reclaimable_space = stats.fullhash.wasted_space;
        summary.scan_duration = start_time.elapsed();

        log::info!(
            "Scan complete: {} duplicate groups, {} duplicate files, {} reclaimable",
            summary.duplicate_groups,
            summary.duplicate_files,
            summary.reclaimable_display()
        );

        Ok((groups, summary))
    }
}
