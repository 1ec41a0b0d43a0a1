//! Error types for MVP Factory.
//!
//! Library crates use [`FactoryError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all MVP Factory operations.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport or API error while calling the generative model.
    #[error("generation error: {0}")]
    Generation(String),

    /// Model response could not be parsed into the expected shape.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Planning produced an unusable plan (empty manifest, missing identity, ...).
    #[error("planning error: {message}")]
    Planning { message: String },

    /// Checkpoint record could not be written, read, or moved.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad path, identity reassignment, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FactoryError>;

impl FactoryError {
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

    /// Create a planning error from any displayable message.
    pub fn planning(msg: impl Into<String>) -> Self {
        Self::Planning {
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
}
