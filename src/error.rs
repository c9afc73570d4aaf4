//! Error types for the Tollgate service.

use thiserror::Error;

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The origin address of a request could not be turned into a client key
    #[error("Client identification error: {0}")]
    ClientIdentification(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for TollgateError {
    fn from(err: config::ConfigError) -> Self {
        TollgateError::Config(err.to_string())
    }
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
