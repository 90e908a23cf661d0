//! Logging to stdout and a local log file.
//!
//! Provides compact timestamped logging with per-module level configuration.
//! Supports `RUST_LOG` environment variable for runtime overrides.
//!
//! # Configuration
//!
//! ```toml
//! [logging]
//! default = "info"
//! file = "auto_push.log"   # "" disables the file
//!
//! [logging.modules]
//! "autopush::git" = "debug"
//! ```
//!
//! # Environment Variable
//!
//! `RUST_LOG` takes precedence over config:
//! ```bash
//! RUST_LOG=debug autopush watch
//! ```
//!
//! The watch loop drops change events for the log file itself, so debug
//! output written next to the watched files never feeds back into it.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::{Mutex, Once};

use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Compact time format for the terminal: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Full date for the log file, which outlives a single session.
struct FileTime;

impl FormatTime for FileTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    // RUST_LOG env var takes precedence over config
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }

    let mut filter_str = config.default.clone();
    for (module, level) in &config.modules {
        filter_str.push_str(&format!(",{module}={level}"));
    }
    EnvFilter::new(&filter_str)
}

fn open_log_file(root: &Path, config: &LoggingConfig) -> Option<File> {
    let path = config.file_path(root)?;

    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Warning: cannot open log file {}: {e}", path.display());
            None
        }
    }
}

/// Initialize logging with configuration.
///
/// Call once at startup. Safe to call multiple times (only first call takes effect).
/// The log file path is resolved against `root`.
pub fn init_with_config(config: &LoggingConfig, root: &Path) {
    INIT.call_once(|| {
        let stdout_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(build_filter(config));

        let file_layer = open_log_file(root, config).map(|file| {
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_timer(FileTime)
                .with_filter(build_filter(config))
        });

        tracing_subscriber::registry()
            .with(stdout_layer)
            .with(file_layer)
            .init();
    });
}

/// Log an event with component context.
///
/// # Examples
/// ```ignore
/// log_event!("watcher", "change detected", "{}", name);
/// log_event!("watcher", "started");
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-only event logging.
///
/// # Examples
/// ```ignore
/// debug_event!("debounce", "extended", "{}", name);
/// ```
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}
