//! Size bucketing and duplicate group types.
//!
//! # Overview
//!
//! Size bucketing is the first phase of duplicate detection. Files with
//! different sizes cannot be duplicates, so every later phase works inside
//! one size bucket at a time.
//!
//! # Example
//!
//! ```
//! use dupstage::scanner::FileRecord;
//! use dupstage::duplicates::bucket_by_size;
//! use std::path::PathBuf;
//! use std::time::SystemTime;
//!
//! let files = vec![
//!     FileRecord::new(PathBuf::from("/file1.txt"), 1024, SystemTime::now()),
//!     FileRecord::new(PathBuf::from("/file2.txt"), 1024, SystemTime::now()),
//!     FileRecord::new(PathBuf::from("/file3.txt"), 2048, SystemTime::now()),
//! ];
//!
//! let (buckets, stats) = bucket_by_size(&files, 1);
//!
//! assert_eq!(stats.total_files, 3);
//! assert_eq!(stats.potential_duplicates, 2);
//! assert_eq!(buckets.len(), 2);
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use crate::scanner::{hash_to_hex, FileRecord, FileSource, Hash, ScanError};

/// Files keyed by their exact size, in discovery order within each bucket.
pub type SizeBuckets = HashMap<u64, Vec<FileRecord>>;

/// Confirmed duplicate group of files.
///
/// Every member has the same size and the same full content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    /// BLAKE3 hash of the file content
    pub hash: Hash,
    /// File size in bytes, shared by all members
    pub size: u64,
    /// Members of the group (at least two)
    pub files: Vec<FileRecord>,
}

impl DuplicateGroup {
    /// Create a new duplicate group.
    #[must_use]
    pub fn new(hash: Hash, size: u64, files: Vec<FileRecord>) -> Self {
        Self { hash, size, files }
    }

    /// Number of files in this group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if this group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of redundant copies (all members but one).
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.files.len().saturating_sub(1)
    }

    /// Space that removing the redundant copies would reclaim.
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.size * self.duplicate_count() as u64
    }

    /// Hash as hexadecimal string.
    #[must_use]
    pub fn hash_hex(&self) -> String {
        hash_to_hex(&self.hash)
    }

    /// Get just the paths of files in this group.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}

/// Statistics from the size-bucketing pass.
#[derive(Debug, Default)]
pub struct GroupingStats {
    /// Number of files placed into buckets
    pub total_files: usize,
    /// Total size of all bucketed files in bytes
    pub total_size: u64,
    /// Files dropped by the minimum size filter
    pub below_min_size: usize,
    /// Number of distinct sizes seen
    pub unique_sizes: usize,
    /// Files that share their size with at least one other file
    pub potential_duplicates: usize,
    /// Files alone in their bucket
    pub eliminated_unique: usize,
    /// Buckets with 2+ files
    pub candidate_buckets: usize,
    /// Entries that could not be read during the walk
    pub errors: Vec<ScanError>,
    /// Whether the walk stopped early because of a shutdown request
    pub interrupted: bool,
}

impl GroupingStats {
    /// Percentage of files eliminated by size alone.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.eliminated_unique as f64 / self.total_files as f64) * 100.0
        }
    }
}

/// Group every file from `source` by exact size (Phase 1).
///
/// Files smaller than `min_size` are left out. Read errors are collected in
/// the returned stats and never stop the pass. Singleton buckets stay in the
/// map; the resolver discards them.
///
/// # Arguments
///
/// * `source` - Where file records come from (usually a [`crate::scanner::Walker`])
/// * `min_size` - Inclusive minimum size in bytes
#[must_use]
pub fn bucket_by_size<S>(source: &S, min_size: u64) -> (SizeBuckets, GroupingStats)
where
    S: FileSource + ?Sized,
{
    let mut buckets = SizeBuckets::new();
    let mut stats = GroupingStats::default();

    for result in source.records() {
        match result {
            Ok(record) => {
                if record.size < min_size {
                    stats.below_min_size += 1;
                    continue;
                }
                stats.total_files += 1;
                stats.total_size += record.size;
                buckets.entry(record.size).or_default().push(record);
            }
            Err(e) => {
                log::debug!("Skipping unreadable entry: {}", e);
                stats.errors.push(e);
            }
        }
    }

    stats.unique_sizes = buckets.len();
    for (size, files) in &buckets {
        if files.len() > 1 {
            stats.potential_duplicates += files.len();
            stats.candidate_buckets += 1;
            log::trace!("Size bucket {} bytes: {} files", size, files.len());
        } else {
            stats.eliminated_unique += 1;
        }
    }

    log::info!(
        "Pass 1 complete: {} files scanned, {} share a size with at least one other ({:.1}% eliminated)",
        stats.total_files,
        stats.potential_duplicates,
        stats.elimination_rate()
    );
    if !stats.errors.is_empty() {
        log::info!("Skipped {} unreadable entries", stats.errors.len());
    }

    (buckets, stats)
}
