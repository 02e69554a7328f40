//! Repository metadata lookup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use validator::Validate;

/// What the server knows about a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RepositoryRecord {
    /// Account ID of the owner. Also the first segment of the storage prefix.
    #[validate(length(min = 1))]
    pub owner_id: String,
    /// Owner name as it appears in URLs.
    #[validate(length(min = 1))]
    pub owner: String,
    /// Repository name, without a `.git` suffix.
    #[validate(length(min = 1))]
    pub name: String,
    /// Private repositories require the owner's credentials for every access.
    #[serde(default)]
    pub private: bool,
}

/// Resolves `/{owner}/{repo}` to a repository record.
#[async_trait]
pub trait RepositoryLookup: Send + Sync {
    /// Finds a repository; `name` has already had any `.git` suffix removed.
    async fn find(&self, owner: &str, name: &str) -> Option<RepositoryRecord>;
}

#[async_trait]
impl<T: RepositoryLookup + ?Sized> RepositoryLookup for Arc<T> {
    async fn find(&self, owner: &str, name: &str) -> Option<RepositoryRecord> {
        (**self).find(owner, name).await
    }
}

/// A fixed set of repositories, typically loaded from configuration.
#[derive(Debug, Default, Clone)]
pub struct StaticRepositories {
    records: HashMap<(String, String), RepositoryRecord>,
}

impl StaticRepositories {
    /// Indexes `records` by owner and name. Later duplicates win.
    pub fn new(records: impl IntoIterator<Item = RepositoryRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|r| ((r.owner.clone(), r.name.clone()), r))
            .collect();
        Self { records }
    }

    /// Number of repositories.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no repositories are configured.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RepositoryLookup for StaticRepositories {
    async fn find(&self, owner: &str, name: &str) -> Option<RepositoryRecord> {
        self.records
            .get(&(owner.to_string(), name.to_string()))
            .cloned()
    }
}
