use dupstage::duplicates::{DuplicateFinder, FinderConfig, FinderError};
use dupstage::scanner::{SkipSet, WalkerConfig, PREHASH_SIZE};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    File::create(path).unwrap().write_all(content).unwrap();
}

#[test]
fn test_scan_empty_directory() {
    let dir = tempdir().unwrap();
    let finder = DuplicateFinder::with_defaults();

    let (groups, summary) = finder.find_duplicates(dir.path()).unwrap();

    assert!(groups.is_empty());
    assert_eq!(summary.total_files, 0);
    assert_eq!(summary.duplicate_groups, 0);
}

#[test]
fn test_scan_unique_files() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", b"content a");
    write(dir.path(), "b.txt", b"content bb");
    write(dir.path(), "c.txt", b"content ccc");

    let finder = DuplicateFinder::with_defaults();
    let (groups, summary) = finder.find_duplicates(dir.path()).unwrap();

    assert!(groups.is_empty());
    assert_eq!(summary.total_files, 3);
    assert_eq!(summary.eliminated_by_size, 3);
    assert_eq!(summary.bytes_hashed, 0);
}

#[test]
fn test_scan_finds_nested_duplicates() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", b"hello");
    write(dir.path(), "d/b.txt", b"hello");
    write(dir.path(), "d/c.txt", b"world");

    let finder = DuplicateFinder::with_defaults();
    let (groups, summary) = finder.find_duplicates(dir.path()).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(
        groups[0].paths(),
        vec![dir.path().join("a.txt"), dir.path().join("d/b.txt")]
    );
    assert_eq!(groups[0].size, 5);
    assert_eq!(summary.total_files, 3);
    assert_eq!(summary.duplicate_files, 1);
    assert_eq!(summary.reclaimable_space, 5);
    assert!(groups[0].files.iter().all(|f| f.fingerprint.is_some()));
}

#[test]
fn test_prefix_difference_eliminates_before_full_hash() {
    let dir = tempdir().unwrap();
    let mut x = vec![b'A'; PREHASH_SIZE + 1];
    let mut y = x.clone();
    x[0] = b'X';
    y[0] = b'Y';
    write(dir.path(), "x.bin", &x);
    write(dir.path(), "y.bin", &y);

    let finder = DuplicateFinder::with_defaults();
    let (groups, summary) = finder.find_duplicates(dir.path()).unwrap();

    assert!(groups.is_empty());
    assert_eq!(summary.eliminated_by_prehash, 2);
    assert_eq!(summary.bytes_hashed, 0);
}

#[test]
fn test_tail_difference_caught_by_full_hash() {
    let dir = tempdir().unwrap();
    let mut x = vec![0u8; PREHASH_SIZE + 100];
    let mut y = x.clone();
    x[PREHASH_SIZE + 50] = 1;
    y[PREHASH_SIZE + 50] = 2;
    write(dir.path(), "x.bin", &x);
    write(dir.path(), "y.bin", &y);

    let finder = DuplicateFinder::with_defaults();
    let (groups, summary) = finder.find_duplicates(dir.path()).unwrap();

    assert!(groups.is_empty());
    assert_eq!(summary.eliminated_by_prehash, 0);
    assert_eq!(summary.bytes_hashed, 2 * x.len() as u64);
}

#[test]
fn test_multiple_groups_ordered_by_size_descending() {
    let dir = tempdir().unwrap();
    write(dir.path(), "small1", b"ab");
    write(dir.path(), "small2", b"ab");
    write(dir.path(), "big1", b"abcdefgh");
    write(dir.path(), "big2", b"abcdefgh");
    write(dir.path(), "big3", b"abcdefgh");

    let finder = DuplicateFinder::with_defaults();
    let (groups, summary) = finder.find_duplicates(dir.path()).unwrap();

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].size, 8);
    assert_eq!(groups[0].len(), 3);
    assert_eq!(groups[1].size, 2);
    assert_eq!(summary.duplicate_files, 3);
    assert_eq!(summary.reclaimable_space, 2 * 8 + 2);
}

#[test]
fn test_min_size_is_inclusive() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a", b"1234");
    write(dir.path(), "b", b"1234");
    write(dir.path(), "c", b"123");
    write(dir.path(), "d", b"123");

    let walker_config = WalkerConfig {
        min_size: 4,
        ..Default::default()
    };
    let finder = DuplicateFinder::new(FinderConfig::default().with_walker_config(walker_config));
    let (groups, summary) = finder.find_duplicates(dir.path()).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].size, 4);
    assert_eq!(summary.total_files, 2);
}

#[test]
fn test_empty_files_never_grouped_by_default() {
    let dir = tempdir().unwrap();
    write(dir.path(), "empty1", b"");
    write(dir.path(), "empty2", b"");

    let finder = DuplicateFinder::with_defaults();
    let (groups, summary) = finder.find_duplicates(dir.path()).unwrap();

    assert!(groups.is_empty());
    assert_eq!(summary.total_files, 0);
}

#[test]
fn test_skip_dirs_are_pruned_case_insensitively() {
    let dir = tempdir().unwrap();
    write(dir.path(), "keep/a.txt", b"same");
    write(dir.path(), "$RECYCLE.BIN/b.txt", b"same");
    write(dir.path(), "Node_Modules/pkg/c.txt", b"same");

    let walker_config = WalkerConfig {
        skip: SkipSet::new(["$recycle.bin", "node_modules"]),
        ..Default::default()
    };
    let finder = DuplicateFinder::new(FinderConfig::default().with_walker_config(walker_config));
    let (groups, summary) = finder.find_duplicates(dir.path()).unwrap();

    assert!(groups.is_empty());
    assert_eq!(summary.total_files, 1);
}

#[test]
fn test_io_thread_count_does_not_change_result() {
    let dir = tempdir().unwrap();
    for i in 0..20 {
        write(dir.path(), &format!("set{}/file{}.dat", i % 4, i), format!("payload {}", i % 5).as_bytes());
    }

    let single = DuplicateFinder::new(FinderConfig::default().with_io_threads(1))
        .find_duplicates(dir.path())
        .unwrap()
        .0;
    let many = DuplicateFinder::new(FinderConfig::default().with_io_threads(8))
        .find_duplicates(dir.path())
        .unwrap()
        .0;

    assert_eq!(single, many);
}

#[test]
fn test_root_errors() {
    let dir = tempdir().unwrap();
    let finder = DuplicateFinder::with_defaults();

    let missing = dir.path().join("missing");
    assert!(matches!(
        finder.find_duplicates(&missing),
        Err(FinderError::PathNotFound(_))
    ));

    write(dir.path(), "file.txt", b"x");
    assert!(matches!(
        finder.find_duplicates(&dir.path().join("file.txt")),
        Err(FinderError::NotADirectory(_))
    ));
}

#[cfg(unix)]
#[test]
fn test_symlinks_not_followed_by_default() {
    let dir = tempdir().unwrap();
    write(dir.path(), "real.txt", b"linked content");
    std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt")).unwrap();

    let finder = DuplicateFinder::with_defaults();
    let (groups, summary) = finder.find_duplicates(dir.path()).unwrap();

    assert!(groups.is_empty());
    assert_eq!(summary.total_files, 1);
}

#[test]
fn test_relative_root_yields_absolute_paths() {
    let dir = tempfile::Builder::new()
        .prefix("relative-scan")
        .tempdir_in(".")
        .unwrap();
    assert!(dir.path().is_relative());
    write(dir.path(), "a.txt", b"same");
    write(dir.path(), "sub/b.txt", b"same");

    let (groups, _) = DuplicateFinder::with_defaults()
        .find_duplicates(dir.path())
        .unwrap();

    assert_eq!(groups.len(), 1);
    for file in &groups[0].files {
        assert!(file.path.is_absolute(), "{} is relative", file.path.display());
        assert!(file.path.exists());
    }
}
