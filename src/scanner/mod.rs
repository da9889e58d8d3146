//! Scanner module for directory traversal and file fingerprinting.
//!
//! This module provides functionality for:
//! - Single-threaded directory walking using walkdir, with skip-list pruning
//! - Prefix fingerprints with xxh3-128 and full fingerprints with BLAKE3
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and file discovery
//! - [`hasher`]: Partial and full content fingerprints (streaming)
//!
//! # Example
//!
//! ```no_run
//! use dupstage::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let config = WalkerConfig {
//!     min_size: 1024,
//!     ..Default::default()
//! };
//!
//! let walker = Walker::new(Path::new("."), config);
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod hasher;
pub mod walker;

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

pub use hasher::{
    hash_to_hex, Fingerprinter, Hash, Hasher, PartialHash, CHUNK_SIZE, PREHASH_SIZE,
};
pub use walker::Walker;

/// Metadata for a discovered file.
///
/// Created during the size-bucketing pass and discarded at the end of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time as observed during the walk
    pub modified: SystemTime,
    /// Full content fingerprint, set once the file is confirmed as a duplicate
    pub fingerprint: Option<Hash>,
}

impl FileRecord {
    /// Create a new FileRecord without a fingerprint.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
            fingerprint: None,
        }
    }
}

/// Case-insensitive set of directory names that are never descended into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipSet {
    names: HashSet<String>,
}

impl SkipSet {
    /// Build a skip set from directory names. Names are matched case-insensitively.
    #[must_use]
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().trim().to_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    /// Number of names in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Check if a single name is in the set.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&name.to_lowercase())
    }

    /// Decide whether a directory must be pruned.
    ///
    /// Returns `true` if any normal component of `path` matches a name in
    /// the set, ignoring case. Root, prefix and `.`/`..` components never match.
    #[must_use]
    pub fn should_prune(&self, path: &Path) -> bool {
        if self.names.is_empty() {
            return false;
        }
        path.components().any(|c| match c {
            Component::Normal(name) => self.names.contains(&name.to_string_lossy().to_lowercase()),
            _ => false,
        })
    }
}

/// Configuration for directory walking.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Follow symbolic links during traversal.
    /// Warning: a followed link makes the target appear twice.
    pub follow_symlinks: bool,

    /// Minimum file size to include (in bytes, inclusive).
    pub min_size: u64,

    /// Directories whose name matches are pruned.
    pub skip: SkipSet,

    /// Emit a progress line every this many files.
    pub progress_interval: usize,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            min_size: 1,
            skip: SkipSet::default(),
            progress_interval: 10_000,
        }
    }
}

/// A source of file records for the size-bucketing pass.
///
/// [`Walker`] is the filesystem implementation; any iterator of records can
/// stand in for it, which keeps the bucketing logic testable without a tree.
pub trait FileSource {
    /// Produce every discovered file, or an error for entries that could not be read.
    fn records(&self) -> Box<dyn Iterator<Item = Result<FileRecord, ScanError>> + '_>;
}

impl FileSource for Vec<FileRecord> {
    fn records(&self) -> Box<dyn Iterator<Item = Result<FileRecord, ScanError>> + '_> {
        Box::new(self.iter().cloned().map(Ok::<FileRecord, ScanError>))
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A file could not be fingerprinted.
    #[error(transparent)]
    Hash(#[from] HashError),
}

/// Errors that can occur during file hashing.
///
/// A hash error excludes the file from comparison; it never aborts a scan.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Hashing stopped because shutdown was requested.
    #[error("Interrupted while hashing {0}")]
    Interrupted(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    /// Classify an I/O error for the given path.
    #[must_use]
    pub fn from_io(path: &Path, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// Path of the file that failed.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p) | Self::PermissionDenied(p) | Self::Interrupted(p) => p,
            Self::Io { path, .. } => path,
        }
    }
}
