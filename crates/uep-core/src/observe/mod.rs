//! # Observability
//!
//! Structured logging for simulation runs. Components emit `tracing`
//! events; binaries install a subscriber once with [`init_logging`].

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
