//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested key or path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation is not supported by this filesystem.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// A key or path escaped its repository or was otherwise malformed.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The backing object store reported a failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Returns true if this error means "the thing is absent".
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// A specialized Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
