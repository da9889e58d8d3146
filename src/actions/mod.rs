//! File actions module.
//!
//! Duplicates are never deleted. Redundant copies are moved into a staging
//! area that mirrors the scanned tree, or only planned in dry-run mode.
//!
//! ```no_run
//! use dupstage::actions::{RelocateConfig, Relocator};
//!
//! let config = RelocateConfig::new("/data", "/staging").with_dry_run(false);
//! let relocator = Relocator::new(config);
//! ```

pub mod relocate;

pub use relocate::{
    staging_destination, Action, FileSnapshot, Mover, PlanEntry, RelocateConfig, RelocateError,
    RelocationReport, RelocationSummary, Relocator, StagingMover,
};
