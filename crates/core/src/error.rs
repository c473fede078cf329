//! Unified error types for glimmer.
//!
//! Only local-resource failures live here. Remote failures are modeled by
//! [`crate::remote::RemoteError`] and are absorbed by the sync orchestrator.

use crate::config::ConfigError;

/// Unified error type for store and orchestration failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Filesystem operation failed (permission denied, disk full, ...).
    #[error("STORE_IO: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded for persistence.
    #[error("STORE_ENCODE: {0}")]
    Encode(#[from] serde_json::Error),

    /// A key did not have the expected hex digest shape.
    #[error("INVALID_KEY: {0}")]
    InvalidKey(String),

    /// Invalid input parameters (e.g., zero page size).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Configuration could not be loaded or validated.
    #[error("CONFIG: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Stable short code for this error, used in operator-facing output.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) => "STORE_IO",
            Error::Encode(_) => "STORE_ENCODE",
            Error::InvalidKey(_) => "INVALID_KEY",
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::Config(_) => "CONFIG",
        }
    }
}
