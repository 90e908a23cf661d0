//! Configuration module for autopush.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`.autopush/settings.toml`)
//! - Environment variable overrides
//! - CLI argument overrides (applied by the command layer)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `AUTOPUSH_` and use double
//! underscores to separate nested levels:
//! - `AUTOPUSH_WATCH__QUIET_PERIOD_SECS=10` sets `watch.quiet_period_secs`
//! - `AUTOPUSH_GIT__BRANCH=dev` sets `git.branch`
//! - `AUTOPUSH_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::encoding::{EncodingError, EncodingReader};

/// Directory holding the workspace configuration.
pub const CONFIG_DIR: &str = ".autopush";

/// Settings file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Repository root (where .autopush is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Which files to watch and how
    #[serde(default)]
    pub watch: WatchConfig,

    /// Git invocation and commit settings
    #[serde(default)]
    pub git: GitConfig,

    /// Text encoding probing
    #[serde(default)]
    pub encoding: EncodingConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How change notifications are produced.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WatchStrategy {
    /// Native filesystem events.
    #[default]
    Event,
    /// Periodic content hash comparison.
    Poll,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Files to watch, relative to the workspace root
    #[serde(default = "default_files")]
    pub files: Vec<String>,

    /// Inactivity required before a change is committed
    #[serde(default = "default_quiet_period_secs")]
    pub quiet_period_secs: f64,

    /// Notification backend
    #[serde(default)]
    pub strategy: WatchStrategy,

    /// Hash comparison interval for the poll strategy
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitConfig {
    /// Git executable
    #[serde(default = "default_git_program")]
    pub program: String,

    /// Remote to push to
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Branch to push
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Commit message template; `{file}` and `{timestamp}` are substituted
    #[serde(default = "default_commit_template")]
    pub commit_template: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EncodingConfig {
    /// Candidate encodings, tried in order (WHATWG labels)
    #[serde(default = "default_candidates")]
    pub candidates: Vec<String>,

    /// Decode each changed file before publishing it
    #[serde(default = "default_true")]
    pub probe: bool,

    /// Try self-validating encodings (UTF-8, UTF-16) before legacy code pages
    #[serde(default = "default_true")]
    pub prefer_strict: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Log file, relative to the workspace root. An empty path disables file logging.
    #[serde(default = "default_log_file", skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Per-module overrides, e.g. `autopush::git = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

/// Settings that load fine but cannot be used.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No files configured to watch")]
    NoFiles,

    #[error("Invalid {field}: {value} (must be a positive number of seconds)")]
    InvalidDuration { field: &'static str, value: f64 },

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_files() -> Vec<String> {
    vec!["plan-data.json".to_string()]
}
fn default_quiet_period_secs() -> f64 {
    5.0
}
fn default_poll_interval_secs() -> f64 {
    30.0
}
fn default_git_program() -> String {
    "git".to_string()
}
fn default_remote() -> String {
    "origin".to_string()
}
fn default_branch() -> String {
    "main".to_string()
}
fn default_commit_template() -> String {
    "Auto-update: {file} - {timestamp}".to_string()
}
fn default_candidates() -> Vec<String> {
    vec![
        "utf-8".to_string(),
        "windows-1256".to_string(),
        "windows-1252".to_string(),
    ]
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("auto_push.log"))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            watch: WatchConfig::default(),
            git: GitConfig::default(),
            encoding: EncodingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            files: default_files(),
            quiet_period_secs: default_quiet_period_secs(),
            strategy: WatchStrategy::default(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            program: default_git_program(),
            remote: default_remote(),
            branch: default_branch(),
            commit_template: default_commit_template(),
        }
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
            probe: true,
            prefer_strict: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            file: default_log_file(),
            modules: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Resolved log file location, `None` when file logging is off.
    pub fn file_path(&self, root: &Path) -> Option<PathBuf> {
        self.file
            .as_ref()
            .filter(|file| !file.as_os_str().is_empty())
            .map(|file| root.join(file))
    }
}

impl WatchConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_secs_f64(self.quiet_period_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }
}

impl EncodingConfig {
    /// Build a reader from the configured labels.
    pub fn reader(&self) -> Result<EncodingReader, EncodingError> {
        let reader = EncodingReader::from_labels(&self.candidates)?;
        Ok(if self.prefer_strict {
            reader.prefer_strict()
        } else {
            reader
        })
    }
}

impl Settings {
    /// Load configuration from all sources, searching from the current directory
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let current = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::load_in(&current)
    }

    /// Load configuration, searching for `.autopush` from `start` upwards
    pub fn load_in(start: &Path) -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config(start)
            .unwrap_or_else(|| start.join(CONFIG_DIR).join(CONFIG_FILE));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                // If workspace_root is not set in config, detect it
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Some(
                        Self::workspace_root_from(start).unwrap_or_else(|| start.to_path_buf()),
                    );
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels; single underscores
            // stay inside field names
            .merge(Env::prefixed("AUTOPUSH_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find `.autopush/settings.toml` in `start` or any of its ancestors
    fn find_workspace_config(start: &Path) -> Option<PathBuf> {
        Self::workspace_root_from(start).map(|root| root.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Get the workspace root directory (where .autopush is located)
    pub fn workspace_root_from(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Repository root used for git commands and relative file names.
    pub fn root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Check that the loaded values can actually drive a watch session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.files.is_empty() {
            return Err(ConfigError::NoFiles);
        }
        check_seconds("watch.quiet_period_secs", self.watch.quiet_period_secs)?;
        check_seconds("watch.poll_interval_secs", self.watch.poll_interval_secs)?;
        self.encoding.reader()?;
        Ok(())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file under `root`
    pub fn init_config_file(root: &Path, force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

fn check_seconds(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && Duration::try_from_secs_f64(value).is_ok() {
        Ok(())
    } else {
        Err(ConfigError::InvalidDuration { field, value })
    }
}
