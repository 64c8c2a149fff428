//! # Structured Logging
//!
//! `tracing` subscriber setup for simulation runs. Events go to stderr so
//! that stdout stays free for results.
//!
//! ## Example
//!
//! ```rust,ignore
//! use uep_core::observe::{init_logging, LogConfig, LogFormat, LogLevel};
//!
//! let config = LogConfig {
//!     level: LogLevel::Debug,
//!     format: LogFormat::Json,
//!     ..Default::default()
//! };
//! init_logging(&config);
//!
//! tracing::info!(nblocks = 1000, "simulation started");
//! ```

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level
    #[default]
    Info,
    /// Warning level
    Warn,
    /// Error level (least verbose)
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event
    Json,
    /// Multi-line, human-readable
    #[default]
    Pretty,
    /// One line per event
    Compact,
}

/// Logging configuration, usually read from the `logging` section of a run file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level used when neither `filter` nor `RUST_LOG` is set
    pub level: LogLevel,
    /// Output format
    pub format: LogFormat,
    /// Directive filter, e.g. `"uep_core=debug,uep_sim=info"`
    pub filter: Option<String>,
    /// Include file and line of each event
    pub source_location: bool,
    /// Include worker thread names
    pub thread_names: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            filter: None,
            source_location: false,
            thread_names: false,
        }
    }
}

impl LogConfig {
    /// Debug output with call sites and worker names.
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            source_location: true,
            thread_names: true,
            ..Default::default()
        }
    }

    /// Errors only.
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            format: LogFormat::Compact,
            ..Default::default()
        }
    }

    /// Event filter: explicit `filter`, else `RUST_LOG`, else `level`.
    pub fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.to_string());
        match &self.filter {
            Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }
}

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed; the existing one
/// is kept.
pub fn init_logging(config: &LogConfig) -> bool {
    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_thread_names(config.thread_names);

    let layer = match config.format {
        LogFormat::Json => base.json().boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(config.env_filter())
        .try_init()
        .is_ok()
}
