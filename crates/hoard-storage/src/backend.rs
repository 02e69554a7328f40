//! Object store contract.
//!
//! An object store is a flat key-value namespace with prefix listing, in the
//! style of S3 or R2. Keys are `/`-separated strings; there are no real
//! directories.

use crate::{Result, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Largest number of keys a single batch delete may carry by default.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Keys on this page, in ascending order.
    pub keys: Vec<String>,
    /// Cursor for the next page, or `None` when the listing is exhausted.
    pub next: Option<String>,
}

/// A remote key-value object store.
///
/// Implementations report absence as `Ok(None)` from [`ObjectStore::get`];
/// every other failure is an error the caller treats as fatal I/O.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetches the value stored at `key`.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Stores `data` at `key`, replacing any previous value.
    async fn put(&self, key: &str, data: Bytes) -> Result<()>;

    /// Removes `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Lists one page of keys starting with `prefix`.
    ///
    /// `cursor` is the `next` value of the previous page.
    async fn list_page(&self, prefix: &str, cursor: Option<String>) -> Result<ListPage>;

    /// Lists every key starting with `prefix`, draining all pages.
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.list_page(prefix, cursor).await?;
            keys.extend(page.keys);
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(keys)
    }

    /// Deletes several keys in one call.
    ///
    /// Callers must not pass more than [`ObjectStore::max_batch_size`] keys.
    async fn batch_delete(&self, keys: &[String]) -> Result<()> {
        if keys.len() > self.max_batch_size() {
            return Err(StorageError::Backend(format!(
                "batch of {} keys exceeds limit of {}",
                keys.len(),
                self.max_batch_size()
            )));
        }
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }

    /// Maximum number of keys accepted by [`ObjectStore::batch_delete`].
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH_SIZE
    }
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        (**self).put(key, data).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }

    async fn list_page(&self, prefix: &str, cursor: Option<String>) -> Result<ListPage> {
        (**self).list_page(prefix, cursor).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        (**self).list(prefix).await
    }

    async fn batch_delete(&self, keys: &[String]) -> Result<()> {
        (**self).batch_delete(keys).await
    }

    fn max_batch_size(&self) -> usize {
        (**self).max_batch_size()
    }
}

/// Pages a sorted key list: keys strictly after `cursor`, at most `page_size`.
pub(crate) fn paginate(sorted: Vec<String>, cursor: Option<&str>, page_size: usize) -> ListPage {
    let page_size = page_size.max(1);
    let start = match cursor {
        Some(c) => sorted.partition_point(|k| k.as_str() <= c),
        None => 0,
    };
    let rest = &sorted[start..];
    if rest.len() > page_size {
        let keys = rest[..page_size].to_vec();
        let next = keys.last().cloned();
        ListPage { keys, next }
    } else {
        ListPage {
            keys: rest.to_vec(),
            next: None,
        }
    }
}
