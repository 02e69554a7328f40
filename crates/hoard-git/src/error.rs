//! Git protocol error types.

use thiserror::Error;

/// Errors that can occur during git protocol operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Invalid pack file format.
    #[error("invalid pack file: {0}")]
    InvalidPack(String),

    /// Invalid pkt-line format.
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    /// Malformed object id, header or body.
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// Object not found.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// A ref name failed validation.
    #[error("invalid ref: {0}")]
    InvalidRef(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] hoard_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GitError {
    /// Returns true if the error means a missing object or file.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::ObjectNotFound(_) => true,
            Self::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }
}

/// Result type for git protocol operations.
pub type Result<T> = std::result::Result<T, GitError>;
