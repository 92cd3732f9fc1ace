/*!
Error types for the Snapvault core engine.
*/

use thiserror::Error;

/// Result type used throughout the Snapvault core.
pub type Result<T> = std::result::Result<T, SnapvaultError>;

/// Errors that can occur during snapshot, restore, purge and scheduling operations.
#[derive(Error, Debug)]
pub enum SnapvaultError {
    /// The data store connection is not ready
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed restore payload, schedule expression or artifact name
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O errors during artifact file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A requested artifact does not exist
    #[error("Artifact not found: {0}")]
    NotFound(String),

    /// Artifact storage adapter errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Data store adapter errors (query, delete or insert failures)
    #[error("Data store error: {0}")]
    Store(String),

    /// Scheduler lifecycle errors
    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl SnapvaultError {
    /// Create a new connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(name: S) -> Self {
        Self::NotFound(name.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new data store error
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    /// Create a new scheduler error
    pub fn scheduler<S: Into<String>>(msg: S) -> Self {
        Self::Scheduler(msg.into())
    }

    /// True when the error should be reported as a missing artifact
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True when the caller supplied malformed input
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
