//! Core error model.

use thiserror::Error;

/// Result type used by the core crate.
pub type CoreResult<T> = Result<T, CoreError>;

/// Core-level error.
///
/// Covers deterministic failures that happen before any job runs
/// (bad configuration, malformed identifiers, invalid submissions).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A configuration value could not be parsed or is out of range.
    #[error("invalid configuration for {key}: {message}")]
    Config { key: String, message: String },

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A submission was rejected before a job was created.
    #[error("validation failed: {0}")]
    Validation(String),
}

impl CoreError {
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
