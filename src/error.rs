//! Error types for the scalebloom filter engine.

use std::io;
use thiserror::Error;

/// The result type used throughout scalebloom.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for filter operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error occurred while creating, growing or syncing the backing file.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The persisted file is malformed or truncated.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The persisted file was written with different parameters than requested.
    #[error("Configuration mismatch: {0}")]
    ConfigMismatch(String),

    /// Filter statistics could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A checksum mismatch was detected.
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// The expected checksum value.
        expected: u32,
        /// The actual checksum value.
        actual: u32,
    },

    /// An internal invariant was violated.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new configuration mismatch error.
    pub fn config_mismatch(msg: impl Into<String>) -> Self {
        Error::ConfigMismatch(msg.into())
    }

    /// Creates a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Returns true for errors that mean the file on disk cannot be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_) | Error::ChecksumMismatch { .. })
    }
}
