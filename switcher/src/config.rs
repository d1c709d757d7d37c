//! Configuration for the project switcher.
//!
//! Roots to scan come from a TOML file; file locations can be overridden
//! through environment variables or the command line.
//!
//! # Files
//!
//! | What | Default | Override |
//! |------|---------|----------|
//! | Config | `<config_dir>/project/config.toml` | `--config`, then `PROJECT_CONFIG` |
//! | Cache | `<cache_dir>/project/config.json` | `PROJECT_CACHE` |
//!
//! `<config_dir>` and `<cache_dir>` are the platform directories reported by
//! [`directories::BaseDirs`] (`~/.config` and `~/.cache` on Linux).
//!
//! # Format
//!
//! ```toml
//! max_depth = 6
//! markers = [".git"]
//!
//! [[root_dirs]]
//! path = "~/dev"
//! prefix = "w-"
//!
//! [[root_dirs]]
//! path = "/srv/src"
//! ```
//!
//! # Example
//!
//! ```no_run
//! use project_switcher::config::Config;
//!
//! let config = Config::load(None).expect("Failed to load configuration");
//! for root in &config.root_dirs {
//!     println!("{} -> {}", root.path.display(), root.prefix);
//! }
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "PROJECT_CONFIG";

/// Environment variable overriding the cache file location.
pub const CACHE_PATH_ENV: &str = "PROJECT_CACHE";

/// Directory name used under the platform config and cache directories.
const APP_DIR: &str = "project";

/// Config file name inside [`APP_DIR`].
const CONFIG_FILE_NAME: &str = "config.toml";

/// Cache file name inside [`APP_DIR`].
const CACHE_FILE_NAME: &str = "config.json";

/// Log file name; lives next to the cache file.
pub const LOG_FILE_NAME: &str = "project.log";

/// Default depth limit for directory walks.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Default version-control marker directory.
const DEFAULT_MARKER: &str = ".git";

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,

    /// The config file could not be read.
    #[error("could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has the wrong shape.
    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A value was syntactically fine but unusable.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// One directory tree to scan for projects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootConfiguration {
    /// Absolute directory to walk, with `~` already expanded.
    pub path: PathBuf,

    /// Prepended to every session name derived under this root.
    pub prefix: String,
}

impl RootConfiguration {
    /// Creates a root from an already-expanded path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            prefix: prefix.into(),
        }
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Roots to scan, in file order.
    pub root_dirs: Vec<RootConfiguration>,

    /// Maximum directory depth below each root.
    pub max_depth: usize,

    /// Directory names that mark a project root.
    pub markers: Vec<String>,

    /// Where the config was read from.
    pub config_path: PathBuf,

    /// Where the project index is persisted.
    pub cache_path: PathBuf,
}

/// On-disk shape of the config file.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    root_dirs: Vec<RootDirEntry>,
    max_depth: Option<usize>,
    markers: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RootDirEntry {
    path: String,
    #[serde(default)]
    prefix: String,
}

impl Config {
    /// Loads the configuration.
    ///
    /// The config file location is `explicit_path` if given, otherwise
    /// `PROJECT_CONFIG`, otherwise the platform default.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - The home directory cannot be determined
    /// - The config file is missing or unreadable
    /// - The file is not valid TOML
    /// - A root path is not absolute after `~` expansion, `max_depth` is 0,
    ///   or `markers` is empty
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;

        let config_path = match explicit_path {
            Some(path) => path.to_path_buf(),
            None => env::var_os(CONFIG_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| base_dirs.config_dir().join(APP_DIR).join(CONFIG_FILE_NAME)),
        };

        let cache_path = env::var_os(CACHE_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| base_dirs.cache_dir().join(APP_DIR).join(CACHE_FILE_NAME));

        let contents = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;

        Self::from_toml_str(&contents, base_dirs.home_dir(), config_path, cache_path)
    }

    /// Builds a configuration from TOML text.
    ///
    /// `home` is used to expand `~` in root paths.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn from_toml_str(
        contents: &str,
        home: &Path,
        config_path: PathBuf,
        cache_path: PathBuf,
    ) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: config_path.clone(),
            source,
        })?;

        let max_depth = file.max_depth.unwrap_or(DEFAULT_MAX_DEPTH);
        if max_depth == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_depth".to_string(),
                message: "max_depth must be greater than 0".to_string(),
            });
        }

        let markers: Vec<String> = match file.markers {
            Some(markers) => markers
                .into_iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect(),
            None => vec![DEFAULT_MARKER.to_string()],
        };
        if markers.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "markers".to_string(),
                message: "at least one marker directory name is required".to_string(),
            });
        }

        let mut root_dirs = Vec::with_capacity(file.root_dirs.len());
        for (i, entry) in file.root_dirs.into_iter().enumerate() {
            let path = expand_home(entry.path.trim(), home);
            if !path.is_absolute() {
                return Err(ConfigError::InvalidValue {
                    key: format!("root_dirs[{i}].path"),
                    message: format!("expected an absolute path, got '{}'", entry.path),
                });
            }
            root_dirs.push(RootConfiguration::new(path, entry.prefix));
        }

        Ok(Self {
            root_dirs,
            max_depth,
            markers,
            config_path,
            cache_path,
        })
    }
}

/// Location of the log file: beside the cache file.
///
/// Resolved without reading the config so logging can start first. `None`
/// if no home directory can be determined.
#[must_use]
pub fn log_path() -> Option<PathBuf> {
    match env::var_os(CACHE_PATH_ENV) {
        Some(cache) => Some(
            Path::new(&cache)
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(LOG_FILE_NAME),
        ),
        None => BaseDirs::new().map(|dirs| dirs.cache_dir().join(APP_DIR).join(LOG_FILE_NAME)),
    }
}

/// Expands a leading `~` to `home`.
///
/// Only `~` on its own and `~/...` are expanded; `~user` forms are returned
/// unchanged.
#[must_use]
pub fn expand_home(raw: &str, home: &Path) -> PathBuf {
    if raw == "~" {
        return home.to_path_buf();
    }
    match raw.strip_prefix("~/") {
        Some(rest) => home.join(rest.trim_start_matches('/')),
        None => PathBuf::from(raw),
    }
}
