//! In-memory object store.

use crate::backend::{paginate, ListPage, ObjectStore, DEFAULT_MAX_BATCH_SIZE};
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Default number of keys returned per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// An in-memory object store for testing and ephemeral deployments.
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, Bytes>>,
    page_size: usize,
    max_batch_size: usize,
}

impl MemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_PAGE_SIZE, DEFAULT_MAX_BATCH_SIZE)
    }

    /// Creates a store with explicit listing page size and batch limit.
    pub fn with_limits(page_size: usize, max_batch_size: usize) -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
            max_batch_size: max_batch_size.max(1),
        }
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns every stored key, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        self.data.write().insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.write().remove(key);
        Ok(())
    }

    async fn list_page(&self, prefix: &str, cursor: Option<String>) -> Result<ListPage> {
        let matching: Vec<String> = self
            .data
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        Ok(paginate(matching, cursor.as_deref(), self.page_size))
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}
