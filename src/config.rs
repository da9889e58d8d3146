//! Application configuration management.
//!
//! Settings are layered with figment, later layers winning:
//! built-in defaults < TOML file < `DUPSTAGE_*` environment variables < CLI flags.
//!
//! The TOML file is the one given with `--config`, or `config.toml` in the
//! platform configuration directory when it exists.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::duplicates::KeeperPolicy;
use crate::scanner::{SkipSet, WalkerConfig};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DUPSTAGE_";

/// System folders that are never worth scanning.
pub const DEFAULT_SKIP_DIRS: &[&str] = &[
    "windows",
    "$recycle.bin",
    "system volume information",
    "$windows.~bt",
    "$windows.~ws",
    "recovery",
    "program files",
    "program files (x86)",
    "programdata",
    "norton sandbox",
];

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    /// A layer could not be parsed or has the wrong shape.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),

    /// No traversal root was given.
    #[error("no source directory given (use --source or set `source` in the config file)")]
    MissingSource,

    /// No staging root was given.
    #[error("no staging directory given (use --dest or set `dest` in the config file)")]
    MissingDestination,

    /// A numeric setting is out of range.
    #[error("{name} must be at least 1")]
    ZeroValue {
        /// Setting name
        name: &'static str,
    },
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root folder to scan.
    pub source: Option<PathBuf>,
    /// Staging folder for redundant copies.
    pub dest: Option<PathBuf>,
    /// Folder the CSV report is written to.
    pub report_dir: PathBuf,
    /// Minimum file size in bytes (inclusive).
    pub min_size: u64,
    /// Directory names pruned from the walk (case-insensitive).
    pub skip_dirs: Vec<String>,
    /// Rule for picking the keeper of each group.
    pub keep: KeeperPolicy,
    /// Number of I/O threads for parallel hashing.
    pub io_threads: usize,
    /// Log a progress line every this many files.
    pub progress_interval: usize,
    /// Follow symbolic links during traversal.
    pub follow_symlinks: bool,
    /// Abort on the first unreadable entry.
    pub strict: bool,
    /// Also write log lines to this file.
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: None,
            dest: None,
            report_dir: PathBuf::from("."),
            min_size: 1,
            skip_dirs: DEFAULT_SKIP_DIRS.iter().map(|s| (*s).to_string()).collect(),
            keep: KeeperPolicy::default(),
            io_threads: 4,
            progress_interval: 10_000,
            follow_symlinks: false,
            strict: false,
            log_file: None,
        }
    }
}

/// Values given on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep: Option<KeeperPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub io_threads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_interval: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_symlinks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// Appended to the configured skip list rather than replacing it.
    #[serde(skip)]
    pub extra_skip_dirs: Vec<String>,
}

impl Config {
    /// Load configuration from every layer.
    ///
    /// `config_file` must exist when given; otherwise the platform default
    /// file is used if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a file is missing or any layer is malformed.
    pub fn load(config_file: Option<&Path>, overrides: Overrides) -> Result<Self, ConfigError> {
        let file = match config_file {
            Some(path) if !path.exists() => {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|p| p.exists()),
        };

        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(ref path) = file {
            log::debug!("Loading config file {}", path.display());
            figment = figment.merge(Toml::file(path));
        }
        figment = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(&overrides));

        let mut config: Self = figment.extract().map_err(Box::new)?;
        config.skip_dirs.extend(overrides.extra_skip_dirs);
        Ok(config)
    }

    /// Default platform-specific configuration path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "dupstage", "dupstage")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Check that the configuration can drive a run.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.source_root()?;
        self.staging_root()?;
        if self.io_threads == 0 {
            return Err(ConfigError::ZeroValue { name: "io_threads" });
        }
        if self.progress_interval == 0 {
            return Err(ConfigError::ZeroValue {
                name: "progress_interval",
            });
        }
        Ok(())
    }

    /// Root folder to scan.
    ///
    /// # Errors
    ///
    /// Returns `MissingSource` if none was configured.
    pub fn source_root(&self) -> Result<&Path, ConfigError> {
        self.source.as_deref().ok_or(ConfigError::MissingSource)
    }

    /// Staging folder for redundant copies.
    ///
    /// # Errors
    ///
    /// Returns `MissingDestination` if none was configured.
    pub fn staging_root(&self) -> Result<&Path, ConfigError> {
        self.dest.as_deref().ok_or(ConfigError::MissingDestination)
    }

    /// Normalized skip set.
    #[must_use]
    pub fn skip_set(&self) -> SkipSet {
        SkipSet::new(&self.skip_dirs)
    }

    /// Walker settings derived from this configuration.
    #[must_use]
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig {
            follow_symlinks: self.follow_symlinks,
            min_size: self.min_size,
            skip: self.skip_set(),
            progress_interval: self.progress_interval,
        }
    }
}
