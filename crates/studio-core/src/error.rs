//! Centralized error types for the core crate.

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidSetting { key: String, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Errors produced while decoding an engine result.
///
/// Decoding only fails on input the decoder does not understand, which points
/// at a client/engine version mismatch rather than a bad query.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("unsupported value type: {tag}")]
    UnsupportedType { tag: String },

    #[error("invalid vertex id type: {tag}")]
    InvalidId { tag: String },

    #[error("unsupported plan format: {0}")]
    UnsupportedPlanFormat(String),

    #[error("row has {found} values but result declares {expected} columns")]
    RowWidth { expected: usize, found: usize },
}

/// Result type for decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;
