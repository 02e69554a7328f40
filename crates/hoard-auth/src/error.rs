//! Authentication error types.

use thiserror::Error;

/// Errors raised while checking credentials.
///
/// None of these reach the HTTP caller: every failure is reported as a
/// plain rejection.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The `Authorization` header could not be decoded.
    #[error("invalid authorization header: {0}")]
    InvalidHeader(String),

    /// A stored password record is malformed.
    #[error("invalid password hash: {0}")]
    InvalidHash(String),

    /// The key-derivation function failed.
    #[error("hashing failed: {0}")]
    Hashing(String),

    /// The credential store failed.
    #[error("credential store error: {0}")]
    Store(String),
}

/// Result type for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
