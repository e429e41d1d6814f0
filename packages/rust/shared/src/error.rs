//! Error types for RecallBrief.
//!
//! Library crates use [`RecallBriefError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! The retry layer only looks at [`RecallBriefError::is_transient`]: anything
//! transient is worth another attempt, everything else fails the item at once.

use std::path::PathBuf;

/// Top-level error type for all RecallBrief operations.
#[derive(Debug, thiserror::Error)]
pub enum RecallBriefError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP failure that is not classified further (client setup, etc.).
    #[error("network error: {0}")]
    Network(String),

    /// Timeout, connection reset, rate limiting, 5xx, empty body.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Not found, invalid format, rejected request. Never retried.
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// Every attempt failed transiently.
    #[error("gave up after {attempts} attempts: {last}")]
    ExhaustedRetries {
        attempts: u32,
        last: Box<RecallBriefError>,
    },

    /// One batch chunk failed; sibling chunks are unaffected.
    #[error("chunk {chunk} failed: {message}")]
    ChunkFailure { chunk: usize, message: String },

    /// The remote processing service answered with something unusable.
    #[error("remote service error: {0}")]
    Remote(String),

    /// HTML/JSON parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad request shape, invalid ids, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RecallBriefError>;

impl RecallBriefError {
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

    /// Classify an HTTP status code that is not a success.
    ///
    /// 404 and 410 are permanent; every other non-success (403, 429, 5xx, ...)
    /// is transient.
    pub fn from_status(status: u16, context: impl std::fmt::Display) -> Self {
        match status {
            404 | 410 => Self::Permanent(format!("{context}: HTTP {status}")),
            _ => Self::Transient(format!("{context}: HTTP {status}")),
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = RecallBriefError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = RecallBriefError::ExhaustedRetries {
            attempts: 3,
            last: Box::new(RecallBriefError::Transient("HTTP 503".into())),
        };
        assert!(err.to_string().contains("3 attempts"));
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[test]
    fn status_classification() {
        assert!(RecallBriefError::from_status(503, "x").is_transient());
        assert!(RecallBriefError::from_status(429, "x").is_transient());
        assert!(RecallBriefError::from_status(403, "x").is_transient());
        assert!(RecallBriefError::from_status(400, "x").is_transient());
        assert!(!RecallBriefError::from_status(404, "x").is_transient());
        assert!(!RecallBriefError::from_status(410, "x").is_transient());
    }

    #[test]
    fn exhausted_is_not_transient() {
        let err = RecallBriefError::ExhaustedRetries {
            attempts: 2,
            last: Box::new(RecallBriefError::Transient("timeout".into())),
        };
        assert!(!err.is_transient());
    }
}
