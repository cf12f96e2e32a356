//! Custom error types for function-sync.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Manifest file missing from local directory: {0}")]
    MissingFile(String),

    #[error("Function not found: {0}")]
    NotFound(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Remote service error ({code}): {message}")]
    Remote { code: String, message: String },

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Precondition violated: {0}")]
    Precondition(String),
}

impl SyncError {
    /// Errors that must stop the process instead of being contained to one event.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Config(_) | SyncError::Authentication(_) | SyncError::Precondition(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
