//! Error types for the tollgate crate.

use thiserror::Error;

/// Main error type for tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
