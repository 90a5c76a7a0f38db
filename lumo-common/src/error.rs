//! Common error types for the Lumo catalog services

use thiserror::Error;

/// Common result type for catalog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the catalog services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

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

    /// Upstream returned a retryable failure (5xx, 429, timeout) and the
    /// retry budget was exhausted
    #[error("Transient upstream failure: {0}")]
    TransientUpstream(String),

    /// Upstream returned a non-retryable failure (4xx other than 429)
    #[error("Fatal upstream failure: {0}")]
    FatalUpstream(String),

    /// A domain invariant was violated; the offending record is skipped
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A seat type not permitted by the run's type was ingested
    #[error("Incompatible type: {0}")]
    IncompatibleType(String),

    /// Edit attempted on a record in a frozen review state
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures the upstream client may retry
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientUpstream(_))
    }
}
