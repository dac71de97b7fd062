//! Error types for SkillSync.
//!
//! Library crates use [`SkillSyncError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Top-level error type for all SkillSync operations.
#[derive(Debug, thiserror::Error)]
pub enum SkillSyncError {
    /// Configuration loading or validation error. Always fatal.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure (connect, TLS, body read, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a status the caller has to deal with.
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// Transient server errors persisted through every retry.
    #[error("{url}: gave up after {attempts} attempts")]
    RetriesExhausted { url: String, attempts: u32 },

    /// API quota is (still) exhausted and waiting would exceed the allowed maximum.
    #[error("API quota exhausted ({remaining} remaining, resets at {reset_at})")]
    QuotaExhausted {
        remaining: u32,
        reset_at: DateTime<Utc>,
    },

    /// Malformed header block or generation-service response.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Generation-service call failed (transport, status, or timeout).
    #[error("enrichment error: {0}")]
    Enrichment(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad seed, malformed catalog, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SkillSyncError>;

impl SkillSyncError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
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

    /// Whether this error must abort the run instead of being counted per entry.
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, Self::QuotaExhausted { .. })
    }
}
