//! Common error types for the CLP service

use thiserror::Error;

/// Common result type for CLP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the service crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Signed token could not be verified
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
