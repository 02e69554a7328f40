//! # Hoard Auth
//!
//! HTTP Basic credential verification for the git endpoints.
//!
//! The [`CredentialVerifier`] decodes an `Authorization` header, looks the
//! identifier up in a [`CredentialStore`] and checks the secret against the
//! stored record (scrypt or Argon2). It answers only "who is this";
//! repository ownership checks live with the HTTP layer.
//!
//! ```rust,no_run
//! use hoard_auth::{hash_password, Account, CredentialVerifier, MemoryCredentialStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> hoard_auth::Result<()> {
//! let store = MemoryCredentialStore::with_accounts([Account {
//!     id: "1".into(),
//!     username: "alice".into(),
//!     password_hash: Some(hash_password("secret")?),
//! }]);
//! let verifier = CredentialVerifier::new(Arc::new(store));
//! let identity = verifier.verify(Some("Basic YWxpY2U6c2VjcmV0")).await;
//! assert_eq!(identity.map(|i| i.id), Some("1".to_string()));
//! # Ok(())
//! # }
//! ```

pub mod basic;
pub mod error;
pub mod password;
pub mod store;
pub mod verifier;

pub use basic::BasicCredentials;
pub use error::{AuthError, Result};
pub use password::{constant_time_eq, hash_password, verify_password, PasswordRecord};
pub use store::{Account, CredentialStore, MemoryCredentialStore};
pub use verifier::{CredentialVerifier, Identity};
