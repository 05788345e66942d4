//! Error types for enquete.
//!
//! Library crates use [`EnqueteError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! The variants double as the pipeline's failure taxonomy: only
//! [`EnqueteError::Rewrite`] and [`EnqueteError::Dispatch`] are recoverable,
//! everything else aborts a run.

use std::path::PathBuf;

/// Top-level error type for all enquete operations.
#[derive(Debug, thiserror::Error)]
pub enum EnqueteError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport or parse failure while fetching the news portal.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// The portal answered but yielded no usable items.
    #[error("no news items found on the portal")]
    EmptyFeed,

    /// Remote question generation failed or returned nothing usable.
    #[error("rewrite error: {0}")]
    Rewrite(String),

    /// Delivery to the downstream consumer failed.
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A record id that does not exist.
    #[error("news record {0} not found")]
    NotFound(i64),

    /// Data validation error (oversized title, out-of-order write, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Another run holds the single-flight slot for this job.
    #[error("job `{job}` is already running")]
    Busy { job: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, EnqueteError>;

impl EnqueteError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a pipeline run may substitute a local result and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Rewrite(_) | Self::Dispatch(_))
    }
}
