//! Common error types for lessonpipe

use thiserror::Error;

/// Common result type for lessonpipe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the lessonpipe services
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A conditional update matched zero rows when the caller believed it
    /// held the lease or the flag. The current unit of work must be abandoned.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error is worth retrying on a later poll tick.
    ///
    /// Transient I/O (connection drops, timeouts, 5xx from the row store)
    /// is retryable; data validity and invariant faults are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Database(_) | Error::Http(_) | Error::Io(_) => true,
            Error::Store(_) => true,
            _ => false,
        }
    }
}
