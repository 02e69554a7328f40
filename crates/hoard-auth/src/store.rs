//! Account lookup.

use crate::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// An account that may authenticate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable account ID; repository ownership is checked against it.
    pub id: String,
    /// Login name used as the Basic-auth identifier.
    pub username: String,
    /// Stored password record. Accounts without one cannot log in.
    #[serde(default)]
    pub password_hash: Option<String>,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("has_password", &self.password_hash.is_some())
            .finish()
    }
}

/// Source of accounts.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Looks up an account by its Basic-auth identifier.
    async fn find_account(&self, identifier: &str) -> Result<Option<Account>>;
}

#[async_trait]
impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    async fn find_account(&self, identifier: &str) -> Result<Option<Account>> {
        (**self).find_account(identifier).await
    }
}

/// In-memory accounts keyed by username.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    accounts: RwLock<HashMap<String, Account>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with `accounts`.
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let store = Self::new();
        for account in accounts {
            store.insert(account);
        }
        store
    }

    /// Adds or replaces an account.
    pub fn insert(&self, account: Account) {
        self.accounts
            .write()
            .insert(account.username.clone(), account);
    }

    /// Number of accounts.
    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    /// Whether the store has no accounts.
    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_account(&self, identifier: &str) -> Result<Option<Account>> {
        Ok(self.accounts.read().get(identifier).cloned())
    }
}
