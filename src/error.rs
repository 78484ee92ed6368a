//! Error types for newsdesk.

use thiserror::Error;

/// Common error type for newsdesk.
#[derive(Error, Debug)]
pub enum NewsdeskError {
    /// Database error.
    ///
    /// Errors from sqlx are automatically converted.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error for stored JSON documents.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation error for administrative input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// An item with the same URL is already stored.
    #[error("duplicate item URL: {0}")]
    DuplicateItem(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP client construction error.
    #[error("HTTP client error: {0}")]
    Http(String),
}

impl From<sqlx::Error> for NewsdeskError {
    fn from(e: sqlx::Error) -> Self {
        NewsdeskError::Database(e.to_string())
    }
}

/// Result type alias for newsdesk operations.
pub type Result<T> = std::result::Result<T, NewsdeskError>;
