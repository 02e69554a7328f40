//! Basic-auth credential verification.

use crate::basic::BasicCredentials;
use crate::password::{verify_password, DUMMY_RECORD};
use crate::store::{Account, CredentialStore};
use crate::AuthError;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Account ID.
    pub id: String,
    /// Login name.
    pub username: String,
}

/// Checks `Authorization` headers against a [`CredentialStore`].
///
/// Verification only establishes who the caller is; deciding what they may
/// touch is left to the caller.
#[derive(Clone)]
pub struct CredentialVerifier {
    store: Arc<dyn CredentialStore>,
    hasher: Hasher,
}

type Hasher = fn(&str, &str) -> crate::Result<bool>;

impl CredentialVerifier {
    /// Creates a verifier over `store`.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self::with_hasher(store, verify_password)
    }

    fn with_hasher(store: Arc<dyn CredentialStore>, hasher: Hasher) -> Self {
        Self { store, hasher }
    }

    /// Verifies an optional header value.
    ///
    /// Every failure (absent header, unknown user, no password, wrong
    /// password, broken record) yields `None`.
    pub async fn verify(&self, authorization: Option<&str>) -> Option<Identity> {
        let header = authorization?;
        let credentials = match BasicCredentials::parse(header) {
            Ok(credentials) => credentials,
            Err(e) => {
                debug!(error = %e, "rejecting authorization header");
                return None;
            }
        };
        self.verify_credentials(&credentials).await
    }

    /// Verifies decoded credentials.
    pub async fn verify_credentials(&self, credentials: &BasicCredentials) -> Option<Identity> {
        let identifier = credentials.identifier.as_str();
        match self.check(credentials).await {
            Ok(Some(identity)) => Some(identity),
            Ok(None) => {
                debug!(identifier, "credentials rejected");
                None
            }
            Err(e) => {
                debug!(identifier, error = %e, "credential check failed");
                None
            }
        }
    }

    /// Unknown identifiers and accounts without a password are checked
    /// against [`DUMMY_RECORD`] so every rejection pays for a derivation.
    async fn check(&self, credentials: &BasicCredentials) -> crate::Result<Option<Identity>> {
        let (stored, identity) = match self.store.find_account(&credentials.identifier).await? {
            Some(Account {
                id,
                username,
                password_hash: Some(stored),
            }) => (stored, Some(Identity { id, username })),
            _ => (DUMMY_RECORD.to_string(), None),
        };

        let secret = credentials.secret.clone();
        let hasher = self.hasher;
        let matches = tokio::task::spawn_blocking(move || hasher(&secret, &stored))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))??;

        Ok(identity.filter(|_| matches))
    }
}

impl std::fmt::Debug for CredentialVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVerifier").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::hash_password;
    use crate::store::{Account, MemoryCredentialStore};
    use async_trait::async_trait;

    fn verifier() -> CredentialVerifier {
        let store = MemoryCredentialStore::with_accounts([
            Account {
                id: "7".into(),
                username: "alice".into(),
                password_hash: Some(hash_password("wonderland").unwrap()),
            },
            Account {
                id: "8".into(),
                username: "nopass".into(),
                password_hash: None,
            },
            Account {
                id: "9".into(),
                username: "broken".into(),
                password_hash: Some("not a record".into()),
            },
        ]);
        CredentialVerifier::new(Arc::new(store))
    }

    fn header(id: &str, secret: &str) -> String {
        BasicCredentials {
            identifier: id.into(),
            secret: secret.into(),
        }
        .to_header()
    }

    #[tokio::test]
    async fn test_valid_credentials() {
        let identity = verifier()
            .verify(Some(&header("alice", "wonderland")))
            .await
            .unwrap();
        assert_eq!(
            identity,
            Identity {
                id: "7".into(),
                username: "alice".into()
            }
        );
    }

    #[tokio::test]
    async fn test_rejections_are_uniform() {
        let v = verifier();
        assert!(v.verify(None).await.is_none());
        assert!(v.verify(Some("Basic ###")).await.is_none());
        assert!(v.verify(Some(&header("alice", "wonderlanD"))).await.is_none());
        assert!(v.verify(Some(&header("mallory", "wonderland"))).await.is_none());
        assert!(v.verify(Some(&header("nopass", "anything"))).await.is_none());
        assert!(v.verify(Some(&header("broken", "anything"))).await.is_none());
    }

    static RECORDS_CHECKED: std::sync::Mutex<Vec<String>> = std::sync::Mutex::new(Vec::new());

    fn recording_hasher(secret: &str, stored: &str) -> crate::Result<bool> {
        RECORDS_CHECKED.lock().unwrap().push(stored.to_string());
        verify_password(secret, stored)
    }

    #[tokio::test]
    async fn test_unknown_accounts_still_derive_a_key() {
        let store = MemoryCredentialStore::with_accounts([Account {
            id: "8".into(),
            username: "nopass".into(),
            password_hash: None,
        }]);
        let v = CredentialVerifier::with_hasher(Arc::new(store), recording_hasher);

        assert!(v.verify(Some(&header("mallory", "guess"))).await.is_none());
        assert!(v.verify(Some(&header("nopass", "guess"))).await.is_none());

        let checked = RECORDS_CHECKED.lock().unwrap().clone();
        assert_eq!(checked, vec![DUMMY_RECORD.to_string(), DUMMY_RECORD.to_string()]);
    }

    #[tokio::test]
    async fn test_dummy_record_never_authenticates() {
        let v = verifier();
        for secret in ["x", "wonderland", DUMMY_RECORD] {
            assert!(v.verify(Some(&header("ghost", secret))).await.is_none());
            assert!(v.verify(Some(&header("nopass", secret))).await.is_none());
        }
    }

    struct FailingStore;

    #[async_trait]
    impl CredentialStore for FailingStore {
        async fn find_account(&self, _identifier: &str) -> crate::Result<Option<Account>> {
            Err(AuthError::Store("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_rejection() {
        let v = CredentialVerifier::new(Arc::new(FailingStore));
        assert!(v.verify(Some(&header("alice", "wonderland"))).await.is_none());
    }
}
