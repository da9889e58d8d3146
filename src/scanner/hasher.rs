//! Content fingerprints with streaming reads.
//!
//! # Overview
//!
//! Two digests are computed per candidate file:
//! - **Prehash**: xxh3-128 over at most the first [`PREHASH_SIZE`] bytes. A cheap
//!   pre-filter; collisions only mean "worth a full read".
//! - **Full hash**: BLAKE3 over the whole file, read in [`CHUNK_SIZE`] chunks.
//!   The only basis for declaring two files duplicates.
//!
//! Every failure is returned as a [`HashError`] for that file alone.
//!
//! # Example
//!
//! ```no_run
//! use dupstage::scanner::{hash_to_hex, Fingerprinter, Hasher};
//! use std::path::Path;
//!
//! let hasher = Hasher::new();
//! let full = hasher.full_hash(Path::new("some_file.bin")).unwrap();
//! println!("{}", hash_to_hex(&full));
//! ```

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use xxhash_rust::xxh3::xxh3_128;

use super::HashError;

/// Number of leading bytes covered by the prehash (8 KiB).
pub const PREHASH_SIZE: usize = 8 * 1024;

/// Read buffer size for full hashing (64 KiB).
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Full content digest (BLAKE3, 32 bytes).
pub type Hash = [u8; 32];

/// Prefix digest (xxh3-128).
pub type PartialHash = u128;

/// Convert a full hash to a lowercase hex string.
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    blake3::Hash::from(*hash).to_hex().to_string()
}

/// Source of partial and full fingerprints for the duplicate resolver.
///
/// [`Hasher`] reads the filesystem; tests substitute in-memory content.
pub trait Fingerprinter: Send + Sync {
    /// Digest of at most the first [`PREHASH_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Returns a `HashError` if the file cannot be opened or read.
    fn prehash(&self, path: &Path) -> Result<PartialHash, HashError>;

    /// Collision-resistant digest of the entire content.
    ///
    /// # Errors
    ///
    /// Returns a `HashError` if the file cannot be opened or read.
    fn full_hash(&self, path: &Path) -> Result<Hash, HashError>;
}

/// Filesystem fingerprinter.
#[derive(Debug, Clone, Default)]
pub struct Hasher {
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Hasher {
    /// Create a new hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shutdown flag; full hashing stops between chunks once it is raised.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn open(path: &Path) -> Result<File, HashError> {
        File::open(path).map_err(|e| HashError::from_io(path, e))
    }
}

impl Fingerprinter for Hasher {
    fn prehash(&self, path: &Path) -> Result<PartialHash, HashError> {
        if self.is_shutdown_requested() {
            return Err(HashError::Interrupted(path.to_path_buf()));
        }

        let file = Self::open(path)?;
        let mut buffer = Vec::with_capacity(PREHASH_SIZE);
        file.take(PREHASH_SIZE as u64)
            .read_to_end(&mut buffer)
            .map_err(|e| HashError::from_io(path, e))?;

        Ok(xxh3_128(&buffer))
    }

    fn full_hash(&self, path: &Path) -> Result<Hash, HashError> {
        let mut file = Self::open(path)?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            if self.is_shutdown_requested() {
                return Err(HashError::Interrupted(path.to_path_buf()));
            }
            let n = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::from_io(path, e)),
            };
            hasher.update(&buffer[..n]);
        }

        Ok(*hasher.finalize().as_bytes())
    }
}
