//! Error types for tixsync-core

use thiserror::Error;

/// Result type alias using tixsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tixsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error (connect failure, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected HTTP status from the remote API
    #[error("Remote API error: {message} ({status})")]
    Api { status: u16, message: String },

    /// Rate limiting persisted past the configured retry budget
    #[error("Rate limit retries exhausted for {0}")]
    RateLimited(String),

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Credentials rejected or device access revoked
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Remote resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Remote conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A remote object could not be mapped to a local record
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The run was cancelled through the shared cancellation flag
    #[error("Sync cancelled")]
    Cancelled,

    /// Page worker failure or submission after shutdown
    #[error("Worker error: {0}")]
    Worker(String),
}

impl Error {
    /// Errors that must reach the caller without touching the cursor ledger.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized(_) | Self::PermissionDenied(_) | Self::NotFound(_) | Self::Conflict(_)
        )
    }

    /// Returns true if retrying the whole run later can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(error) => !error.is_builder() && !error.is_redirect(),
            Self::Api { status, .. } => *status >= 500,
            Self::RateLimited(_) | Self::InvalidResponse(_) | Self::Cancelled => true,
            _ => false,
        }
    }

    pub(crate) fn mapping(resource: &str, message: impl std::fmt::Display) -> Self {
        Self::Mapping(format!("{resource}: {message}"))
    }
}
