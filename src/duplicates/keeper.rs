//! Keeper selection for duplicate groups.
//!
//! Exactly one member of every group stays in place; the rest are movers.
//! Selection is pure and deterministic: the same set of files always yields
//! the same keeper, whatever order they were discovered in.

use std::cmp::{Ordering, Reverse};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::DuplicateGroup;
use crate::scanner::FileRecord;

/// Rule for picking the file to retain in a duplicate group.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum KeeperPolicy {
    /// Shortest path wins, ties broken lexicographically
    #[default]
    ShortestPath,
    /// Oldest modification time wins
    Oldest,
    /// Newest modification time wins
    Newest,
}

impl std::fmt::Display for KeeperPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShortestPath => write!(f, "shortest-path"),
            Self::Oldest => write!(f, "oldest"),
            Self::Newest => write!(f, "newest"),
        }
    }
}

/// Path length in characters first, then the path string.
fn path_order(a: &FileRecord, b: &FileRecord) -> Ordering {
    let (a, b) = (a.path.to_string_lossy(), b.path.to_string_lossy());
    a.chars()
        .count()
        .cmp(&b.chars().count())
        .then_with(|| a.cmp(&b))
}

impl KeeperPolicy {
    /// Total order over group members; the minimum is the keeper.
    #[must_use]
    pub fn compare(self, a: &FileRecord, b: &FileRecord) -> Ordering {
        let primary = match self {
            Self::ShortestPath => Ordering::Equal,
            Self::Oldest => a.modified.cmp(&b.modified),
            Self::Newest => Reverse(a.modified).cmp(&Reverse(b.modified)),
        };
        primary.then_with(|| path_order(a, b))
    }
}

/// Choose the file to keep and the files to move.
///
/// Returns `None` only for an empty group.
///
/// # Example
///
/// ```
/// use dupstage::duplicates::{select_keeper, DuplicateGroup, KeeperPolicy};
/// use dupstage::scanner::FileRecord;
/// use std::path::PathBuf;
/// use std::time::SystemTime;
///
/// let files = vec![
///     FileRecord::new(PathBuf::from("dir/b.txt"), 1, SystemTime::now()),
///     FileRecord::new(PathBuf::from("a.txt"), 1, SystemTime::now()),
/// ];
/// let group = DuplicateGroup::new([0; 32], 1, files);
///
/// let (keeper, movers) = select_keeper(&group, KeeperPolicy::ShortestPath).unwrap();
/// assert_eq!(keeper.path, PathBuf::from("a.txt"));
/// assert_eq!(movers.len(), 1);
/// ```
#[must_use]
pub fn select_keeper(
    group: &DuplicateGroup,
    policy: KeeperPolicy,
) -> Option<(&FileRecord, Vec<&FileRecord>)> {
    let mut sorted: Vec<&FileRecord> = group.files.iter().collect();
    sorted.sort_by(|a, b| policy.compare(a, b));

    let mut iter = sorted.into_iter();
    let keeper = iter.next()?;
    Some((keeper, iter.collect()))
}
