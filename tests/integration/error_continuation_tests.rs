use dupstage::duplicates::{DuplicateFinder, FinderConfig, FinderError};
use dupstage::scanner::{FileRecord, HashError, ScanError};
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;
use tempfile::tempdir;

#[test]
fn test_missing_files_are_collected_not_fatal() {
    let finder = DuplicateFinder::with_defaults();
    let files = vec![
        FileRecord::new(PathBuf::from("nonexistent_1.txt"), 100, SystemTime::now()),
        FileRecord::new(PathBuf::from("nonexistent_2.txt"), 100, SystemTime::now()),
    ];

    let (groups, summary) = finder.find_duplicates_from_source(&files).unwrap();

    assert!(groups.is_empty());
    assert_eq!(summary.scan_errors.len(), 2);
    for err in &summary.scan_errors {
        match err {
            ScanError::Hash(HashError::NotFound(_)) => {}
            _ => panic!("Expected NotFound HashError, got: {:?}", err),
        }
    }
}

#[test]
fn test_strict_mode_fails_on_first_error() {
    let finder = DuplicateFinder::new(FinderConfig::default().with_strict(true));
    let files = vec![
        FileRecord::new(PathBuf::from("nonexistent_1.txt"), 100, SystemTime::now()),
        FileRecord::new(PathBuf::from("nonexistent_2.txt"), 100, SystemTime::now()),
    ];

    match finder.find_duplicates_from_source(&files) {
        Err(FinderError::ScanError(ScanError::Hash(HashError::NotFound(_)))) => {}
        other => panic!("Expected NotFound ScanError, got: {:?}", other),
    }
}

#[test]
fn test_vanished_file_does_not_hide_remaining_duplicates() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    fs::write(&a, b"hello").unwrap();
    fs::write(&b, b"hello").unwrap();

    let files = vec![
        FileRecord::new(a.clone(), 5, SystemTime::now()),
        FileRecord::new(b.clone(), 5, SystemTime::now()),
        FileRecord::new(dir.path().join("gone.txt"), 5, SystemTime::now()),
    ];

    let finder = DuplicateFinder::with_defaults();
    let (groups, summary) = finder.find_duplicates_from_source(&files).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].paths(), vec![a, b]);
    assert_eq!(summary.scan_errors.len(), 1);
}

#[test]
fn test_record_size_mismatch_never_joins_group() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    fs::write(&a, b"hello").unwrap();
    fs::write(&b, b"hello").unwrap();

    // b.txt was recorded with a different size, so it sits in another bucket.
    let files = vec![
        FileRecord::new(a, 5, SystemTime::now()),
        FileRecord::new(b, 6, SystemTime::now()),
    ];

    let (groups, _) = DuplicateFinder::with_defaults()
        .find_duplicates_from_source(&files)
        .unwrap();
    assert!(groups.is_empty());
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_excluded_scan_continues() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"shared").unwrap();
    fs::write(dir.path().join("b.txt"), b"shared").unwrap();
    let locked = dir.path().join("c.txt");
    fs::write(&locked, b"shared").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Privileged users can read anything; nothing to observe then.
    if fs::read(&locked).is_ok() {
        return;
    }

    let (groups, summary) = DuplicateFinder::with_defaults()
        .find_duplicates(dir.path())
        .unwrap();

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);
    assert!(!groups[0].paths().contains(&locked));
    assert!(summary
        .scan_errors
        .iter()
        .any(|e| matches!(e, ScanError::Hash(HashError::PermissionDenied(_)))));
}

#[cfg(unix)]
#[test]
fn test_unreadable_directory_subtree_absent() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"shared").unwrap();
    fs::write(dir.path().join("b.txt"), b"shared").unwrap();
    let locked = dir.path().join("locked");
    fs::create_dir(&locked).unwrap();
    fs::write(locked.join("c.txt"), b"shared").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    if fs::read_dir(&locked).is_ok() {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let result = DuplicateFinder::with_defaults().find_duplicates(dir.path());
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    let (groups, summary) = result.unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);
    assert!(!summary.scan_errors.is_empty());
}
