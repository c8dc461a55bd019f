//! Error types for dvdrw

use std::io;
use thiserror::Error;

/// Result type for dvdrw operations
pub type Result<T> = std::result::Result<T, DvdError>;

/// Errors that can occur in dvdrw
#[derive(Debug, Error)]
pub enum DvdError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed cassette data
    #[error("Invalid cassette format: {0}")]
    InvalidFormat(String),

    /// Cassette written by an incompatible version
    #[error("Unsupported cassette version: {found}, expected {expected}")]
    UnsupportedVersion {
        /// Version found in the file
        found: u32,
        /// Version this build understands
        expected: u32,
    },

    /// Attempt to record into a cassette hydrated from storage
    #[error("Cannot record requests when the cassette was loaded from storage")]
    RecordingDisabled,

    /// Replay-only cassette has no unconsumed entry for the request
    #[error("No recorded response for {method} {url} and recording is disabled")]
    UnmatchedInReplay {
        /// Request method
        method: String,
        /// Request URL
        url: String,
    },

    /// URL could not be parsed into request components
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// Offending URL
        url: String,
        /// Parser message
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid cassette name
    #[error("Invalid cassette name: {0}")]
    InvalidCassetteName(String),

    /// Cassette file not found
    #[error("Cassette file not found: {0}")]
    CassetteNotFound(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for DvdError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Self::Io(err.into())
        } else {
            Self::InvalidFormat(err.to_string())
        }
    }
}
