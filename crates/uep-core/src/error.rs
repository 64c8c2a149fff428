//! Error types for UEP simulation.
//!
//! Every failure is fatal to the run that raised it: nothing in this crate
//! retries, and no partial results are produced after an error.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for UEP operations
pub type UepResult<T> = Result<T, UepError>;

/// Errors that can occur while building or running a UEP simulation
#[derive(Error, Debug)]
pub enum UepError {
    /// A parameter is out of its valid range or inconsistent with another one
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The robust soliton spike would fall beyond the symbol range
    #[error("Degree distribution spike at {spike} exceeds {limit} symbols")]
    SpikeOutOfRange { spike: usize, limit: usize },

    /// A cached CDF was built for different parameters than requested
    #[error("Cached CDF mismatch: expected {expected}, found {found}")]
    CacheMismatch { expected: String, found: String },

    /// A cached CDF could not be decoded
    #[error("Corrupt CDF cache entry {}: {reason}", path.display())]
    CacheCorrupt { path: PathBuf, reason: String },

    /// A uniform draw fell past the last CDF entry
    #[error("Uniform draw {draw} exceeds last CDF entry {last}")]
    CdfExhausted { draw: f64, last: f64 },

    /// The burst analyzer cache was written out of order
    #[error("Cache row {row} written out of order: expected k={expected}, got k={got}")]
    CacheOrder { row: usize, expected: usize, got: usize },

    /// Failure reported by a decoder implementation
    #[error("Decoder error: {0}")]
    Decoder(String),

    /// Worker pool could not be created or a worker failed
    #[error("Worker error: {0}")]
    Worker(String),

    /// Run configuration could not be loaded or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl UepError {
    /// Shorthand for [`UepError::InvalidParameter`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        UepError::InvalidParameter(msg.into())
    }
}
