//! Error types for the LSKF rate limiter.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for rate limiter operations.
///
/// Normal guess outcomes are reported through [`crate::ratelimit::Decision`];
/// this type only covers faults of the host collaborators.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A persisted failure counter could not be parsed
    #[error("Corrupt failure counter at {path:?}: {contents:?}")]
    CorruptCounter { path: PathBuf, contents: String },

    /// The tokio scheduler was created outside of a runtime
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for LimiterError {
    fn from(err: config::ConfigError) -> Self {
        LimiterError::Config(err.to_string())
    }
}

/// Result type alias for rate limiter operations.
pub type Result<T> = std::result::Result<T, LimiterError>;
