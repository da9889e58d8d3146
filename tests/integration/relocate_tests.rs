use dupstage::actions::{Action, RelocateConfig, Relocator};
use dupstage::duplicates::{DuplicateFinder, DuplicateGroup, KeeperPolicy};
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Tree {
    _dir: TempDir,
    scan: PathBuf,
    staging: PathBuf,
}

fn tree(files: &[(&str, &[u8])]) -> Tree {
    let dir = TempDir::new().unwrap();
    let scan = dir.path().join("scan");
    let staging = dir.path().join("staging");
    for (rel, content) in files {
        let path = scan.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    fs::create_dir_all(&scan).unwrap();
    Tree {
        _dir: dir,
        scan,
        staging,
    }
}

fn scan(root: &Path) -> Vec<DuplicateGroup> {
    DuplicateFinder::with_defaults()
        .find_duplicates(root)
        .unwrap()
        .0
}

#[test]
fn test_dry_run_leaves_filesystem_untouched() {
    let t = tree(&[("a.txt", b"hello"), ("d/b.txt", b"hello"), ("d/c.txt", b"world")]);
    let groups = scan(&t.scan);

    let report = Relocator::new(RelocateConfig::new(&t.scan, &t.staging)).run(&groups);

    assert_eq!(report.entries.len(), 2);
    assert_eq!(report.entries[0].action, Action::Keep);
    assert_eq!(report.entries[0].source, t.scan.join("a.txt"));
    assert_eq!(report.entries[1].action, Action::WouldMove);
    assert_eq!(report.entries[1].source, t.scan.join("d/b.txt"));
    assert_eq!(
        report.entries[1].destination,
        Some(t.staging.join("d/b.txt"))
    );
    assert_eq!(report.summary.would_move, 1);
    assert_eq!(report.summary.bytes_reclaimable, 5);

    assert!(t.scan.join("d/b.txt").exists());
    assert!(!t.staging.exists());
}

#[test]
fn test_live_run_mirrors_relative_paths() {
    let t = tree(&[
        ("a.txt", b"hello"),
        ("x/y/b.txt", b"hello"),
        ("z/c.txt", b"hello"),
    ]);
    let groups = scan(&t.scan);

    let config = RelocateConfig::new(&t.scan, &t.staging).with_dry_run(false);
    let report = Relocator::new(config).run(&groups);

    let moved: Vec<_> = report
        .entries
        .iter()
        .filter(|e| e.action == Action::Moved)
        .collect();
    assert_eq!(moved.len(), 2);
    assert_eq!(report.summary.bytes_freed, 10);

    assert!(t.scan.join("a.txt").exists());
    assert!(!t.scan.join("x/y/b.txt").exists());
    assert_eq!(fs::read(t.staging.join("x/y/b.txt")).unwrap(), b"hello");
    assert_eq!(fs::read(t.staging.join("z/c.txt")).unwrap(), b"hello");
}

#[test]
fn test_second_run_finds_nothing_to_move() {
    let t = tree(&[("a.txt", b"hello"), ("b.txt", b"hello")]);
    let groups = scan(&t.scan);
    let config = RelocateConfig::new(&t.scan, &t.staging).with_dry_run(false);
    Relocator::new(config).run(&groups);

    assert!(scan(&t.scan).is_empty());
}

#[test]
fn test_oldest_policy_keeps_oldest_copy() {
    let t = tree(&[("a.txt", b"same"), ("deep/dir/b.txt", b"same")]);
    set_file_mtime(t.scan.join("a.txt"), FileTime::from_unix_time(2_000_000_000, 0)).unwrap();
    set_file_mtime(
        t.scan.join("deep/dir/b.txt"),
        FileTime::from_unix_time(1_000_000_000, 0),
    )
    .unwrap();
    let groups = scan(&t.scan);

    let config = RelocateConfig::new(&t.scan, &t.staging).with_policy(KeeperPolicy::Oldest);
    let report = Relocator::new(config).run(&groups);

    assert_eq!(report.entries[0].action, Action::Keep);
    assert_eq!(report.entries[0].source, t.scan.join("deep/dir/b.txt"));
    assert_eq!(report.entries[1].source, t.scan.join("a.txt"));
}

#[test]
fn test_newest_policy_keeps_newest_copy() {
    let t = tree(&[("a.txt", b"same"), ("b.txt", b"same")]);
    set_file_mtime(t.scan.join("a.txt"), FileTime::from_unix_time(1_000_000_000, 0)).unwrap();
    set_file_mtime(t.scan.join("b.txt"), FileTime::from_unix_time(2_000_000_000, 0)).unwrap();
    let groups = scan(&t.scan);

    let config = RelocateConfig::new(&t.scan, &t.staging).with_policy(KeeperPolicy::Newest);
    let report = Relocator::new(config).run(&groups);

    assert_eq!(report.entries[0].source, t.scan.join("b.txt"));
}

#[test]
fn test_existing_destination_is_not_overwritten() {
    let t = tree(&[("a.txt", b"hello"), ("b.txt", b"hello")]);
    let groups = scan(&t.scan);
    fs::create_dir_all(&t.staging).unwrap();
    fs::write(t.staging.join("b.txt"), b"older staged copy").unwrap();

    let config = RelocateConfig::new(&t.scan, &t.staging).with_dry_run(false);
    let report = Relocator::new(config).run(&groups);

    let entry = &report.entries[1];
    assert_eq!(entry.action, Action::Error);
    assert!(entry.reason.as_deref().unwrap().contains("already exists"));
    assert!(t.scan.join("b.txt").exists());
    assert_eq!(
        fs::read(t.staging.join("b.txt")).unwrap(),
        b"older staged copy"
    );
}

#[test]
fn test_file_changed_after_scan_is_not_moved() {
    let t = tree(&[("a.txt", b"hello"), ("b.txt", b"hello"), ("c.txt", b"hello")]);
    let groups = scan(&t.scan);
    fs::write(t.scan.join("b.txt"), b"hello, changed").unwrap();

    let config = RelocateConfig::new(&t.scan, &t.staging).with_dry_run(false);
    let report = Relocator::new(config).run(&groups);

    assert_eq!(report.entries.len(), 3);
    assert_eq!(report.entries[1].action, Action::Error);
    assert!(report.entries[1]
        .reason
        .as_deref()
        .unwrap()
        .starts_with("modified since scan"));
    assert_eq!(report.entries[2].action, Action::Moved);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.moved, 1);
}

#[test]
fn test_vanished_keeper_skips_group() {
    let t = tree(&[
        ("a.txt", b"larger group"),
        ("b.txt", b"larger group"),
        ("long/c.txt", b"small"),
        ("long/d.txt", b"small"),
    ]);
    let groups = scan(&t.scan);
    fs::remove_file(t.scan.join("a.txt")).unwrap();

    let report = Relocator::new(RelocateConfig::new(&t.scan, &t.staging)).run(&groups);

    assert_eq!(report.summary.groups_skipped, 1);
    assert_eq!(report.summary.groups_processed, 1);
    assert!(report
        .entries
        .iter()
        .all(|e| e.source.starts_with(t.scan.join("long"))));
    // Ids stay positional when an earlier group is skipped.
    assert!(report.entries.iter().all(|e| e.group_id == 2));
}

#[test]
fn test_group_ids_are_sequential() {
    let t = tree(&[
        ("a1", b"aaaa"),
        ("a2", b"aaaa"),
        ("b1", b"bb"),
        ("b2", b"bb"),
        ("b3", b"bb"),
    ]);
    let groups = scan(&t.scan);

    let report = Relocator::new(RelocateConfig::new(&t.scan, &t.staging)).run(&groups);
    let ids: Vec<usize> = report.entries.iter().map(|e| e.group_id).collect();

    assert_eq!(ids, vec![1, 1, 2, 2, 2]);
    for id in [1, 2] {
        let keeps = report
            .entries
            .iter()
            .filter(|e| e.group_id == id && e.action == Action::Keep)
            .count();
        assert_eq!(keeps, 1);
    }
}
