//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Size-based file grouping (Phase 1)
//! - Prehash comparison (Phase 2)
//! - Full hash comparison (Phase 3)
//! - Keeper selection within confirmed groups

pub mod finder;
pub mod groups;
pub mod keeper;

pub use finder::{
    phase2_prehash, phase3_fullhash, resolve, DuplicateFinder, FinderConfig, FinderError,
    FullhashStats, PartialBucket, PrehashStats, ResolveStats, ScanSummary,
};
pub use groups::{bucket_by_size, DuplicateGroup, GroupingStats, SizeBuckets};
pub use keeper::{select_keeper, KeeperPolicy};
