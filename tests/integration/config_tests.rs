use clap::Parser;
use dupstage::cli::Cli;
use dupstage::config::{Config, ENV_PREFIX};
use dupstage::duplicates::{FinderError, KeeperPolicy};
use dupstage::error::ExitCode;
use dupstage::run_app;
use figment::providers::{Env, Serialized};
use figment::Figment;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(files: &[(&str, &[u8])]) -> Self {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        fs::create_dir_all(&source).unwrap();
        for (rel, content) in files {
            let path = source.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        Self { dir }
    }

    fn source(&self) -> PathBuf {
        self.dir.path().join("source")
    }

    fn staging(&self) -> PathBuf {
        self.dir.path().join("staging")
    }

    fn reports(&self) -> PathBuf {
        self.dir.path().join("reports")
    }

    fn cli(&self, extra: &[&str]) -> Cli {
        let mut args: Vec<OsString> = vec![
            "dupstage".into(),
            "-q".into(),
            "--source".into(),
            self.source().into(),
            "--dest".into(),
            self.staging().into(),
            "--report-dir".into(),
            self.reports().into(),
        ];
        args.extend(extra.iter().map(OsString::from));
        Cli::parse_from(args)
    }

    fn report_files(&self) -> Vec<PathBuf> {
        match fs::read_dir(self.reports()) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

fn read_rows(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_config_layers_from_env() {
    std::env::set_var("DUPSTAGE_TEST_ONLY_KEEP", "newest");

    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed(&format!("{ENV_PREFIX}TEST_ONLY_")));
    let config: Config = figment.extract().unwrap();

    assert_eq!(config.keep, KeeperPolicy::Newest);
    assert_eq!(config.io_threads, 4);

    std::env::remove_var("DUPSTAGE_TEST_ONLY_KEEP");
}

#[test]
fn test_dry_run_writes_report_and_moves_nothing() {
    let ws = Workspace::new(&[("a.txt", b"hello"), ("d/b.txt", b"hello"), ("d/c.txt", b"world")]);

    let code = run_app(ws.cli(&[])).unwrap();
    assert_eq!(code, ExitCode::Success);

    let reports = ws.report_files();
    assert_eq!(reports.len(), 1);
    let name = reports[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("duplicate_report_"));
    assert!(name.ends_with(".csv"));

    let rows = read_rows(&reports[0]);
    assert_eq!(rows[0], "group,action,original_path,destination,size_bytes");
    assert_eq!(rows.len(), 3);
    assert!(rows[1].starts_with("1,KEEP,"));
    assert!(rows[1].ends_with("a.txt,,5"));
    assert!(rows[2].starts_with("1,WOULD_MOVE,"));

    assert!(ws.source().join("d/b.txt").exists());
    assert!(!ws.staging().exists());
}

#[test]
fn test_move_mode_stages_copies() {
    let ws = Workspace::new(&[("a.txt", b"hello"), ("d/b.txt", b"hello")]);

    let code = run_app(ws.cli(&["--move"])).unwrap();
    assert_eq!(code, ExitCode::Success);

    assert!(ws.source().join("a.txt").exists());
    assert!(!ws.source().join("d/b.txt").exists());
    assert!(ws.staging().join("d/b.txt").exists());

    let rows = read_rows(&ws.report_files()[0]);
    assert!(rows[2].starts_with("1,MOVED,"));
}

#[test]
fn test_no_duplicates_writes_no_report() {
    let ws = Workspace::new(&[("a.txt", b"one"), ("b.txt", b"two!")]);

    let code = run_app(ws.cli(&[])).unwrap();

    assert_eq!(code, ExitCode::Success);
    assert!(ws.report_files().is_empty());
}

#[test]
fn test_missing_source_is_fatal() {
    let ws = Workspace::new(&[]);
    fs::remove_dir(ws.source()).unwrap();

    let err = run_app(ws.cli(&[])).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<FinderError>(),
        Some(FinderError::PathNotFound(_))
    ));
    assert!(ws.report_files().is_empty());
}

#[test]
fn test_missing_destination_is_fatal() {
    let ws = Workspace::new(&[("a.txt", b"x")]);
    let source = ws.source();
    let cli = Cli::parse_from([
        OsString::from("dupstage"),
        "-q".into(),
        "--source".into(),
        source.into(),
    ]);

    assert!(run_app(cli).is_err());
}

#[test]
fn test_config_file_supplies_settings() {
    let ws = Workspace::new(&[
        ("a.bin", b"1234567890"),
        ("b.bin", b"1234567890"),
        ("c.txt", b"abc"),
        ("d.txt", b"abc"),
        ("backup/e.bin", b"1234567890"),
    ]);
    let config_path = ws.dir.path().join("dupstage.toml");
    fs::write(
        &config_path,
        format!(
            "source = {:?}\ndest = {:?}\nreport_dir = {:?}\nmin_size = 10\nskip_dirs = [\"backup\"]\n",
            ws.source(),
            ws.staging(),
            ws.reports(),
        ),
    )
    .unwrap();

    let cli = Cli::parse_from([
        OsString::from("dupstage"),
        "-q".into(),
        "--config".into(),
        config_path.into(),
    ]);
    assert_eq!(run_app(cli).unwrap(), ExitCode::Success);

    let rows = read_rows(&ws.report_files()[0]);
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| !r.contains(".txt")));
    assert!(rows.iter().all(|r| !r.contains("backup")));
}

#[test]
fn test_skip_dir_flag_extends_defaults() {
    let ws = Workspace::new(&[
        ("a.txt", b"same"),
        ("cache/b.txt", b"same"),
        ("Recovery/c.txt", b"same"),
    ]);

    let code = run_app(ws.cli(&["--skip-dir", "cache"])).unwrap();

    assert_eq!(code, ExitCode::Success);
    assert!(ws.report_files().is_empty());
}

#[test]
fn test_missing_config_file_is_fatal() {
    let ws = Workspace::new(&[]);
    let missing = ws.dir.path().join("nope.toml");
    let cli = ws.cli(&["--config", missing.to_str().unwrap()]);

    assert!(run_app(cli).is_err());
}

#[test]
fn test_relative_source_and_dest() {
    let dir = tempfile::Builder::new()
        .prefix("relative-run")
        .tempdir_in(".")
        .unwrap();
    assert!(dir.path().is_relative());
    let source = dir.path().join("source");
    fs::create_dir_all(source.join("d")).unwrap();
    fs::write(source.join("a.txt"), b"hello").unwrap();
    fs::write(source.join("d/b.txt"), b"hello").unwrap();
    let staging = dir.path().join("staging");
    let reports = dir.path().join("reports");

    let cli = Cli::parse_from([
        OsString::from("dupstage"),
        "-q".into(),
        "--move".into(),
        "--source".into(),
        source.clone().into(),
        "--dest".into(),
        staging.clone().into(),
        "--report-dir".into(),
        reports.clone().into(),
    ]);
    assert_eq!(run_app(cli).unwrap(), ExitCode::Success);

    assert!(staging.join("d/b.txt").exists());
    assert!(!source.join("d/b.txt").exists());

    let report = fs::read_dir(&reports).unwrap().next().unwrap().unwrap().path();
    let mut rows = csv::Reader::from_path(report).unwrap();
    for row in rows.records() {
        let row = row.unwrap();
        assert!(Path::new(&row[2]).is_absolute(), "{} is relative", &row[2]);
    }
}
