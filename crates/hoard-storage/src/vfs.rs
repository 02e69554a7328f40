//! Filesystem adapter over an object store.
//!
//! [`ObjectStoreFs`] turns POSIX-style calls from the git object engine into
//! object-store requests for one repository. It owns three per-instance
//! caches:
//!
//! - a file cache, where a tombstone records "confirmed absent";
//! - a listing cache holding the raw keys under each listed prefix;
//! - the set of directories created with `mkdir`, which exist only here.
//!
//! An instance is built for one repository at the start of a request and
//! dropped at the end, so nothing cached is ever observed by another request.
//! Writes and deletes update the caches immediately, which gives
//! read-your-writes inside the request even when the store lags.

use crate::backend::ObjectStore;
use crate::fs::{FileSystem, Metadata};
use crate::key::RepoPrefix;
use crate::{Result, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Cached knowledge about a single key.
#[derive(Debug, Clone)]
enum CacheEntry {
    Present(Bytes),
    Tombstone,
}

/// A [`FileSystem`] backed by an [`ObjectStore`], scoped to one repository.
pub struct ObjectStoreFs {
    store: Arc<dyn ObjectStore>,
    prefix: RepoPrefix,
    files: Mutex<HashMap<String, CacheEntry>>,
    listings: Mutex<HashMap<String, Vec<String>>>,
    dirs: Mutex<HashSet<String>>,
}

impl ObjectStoreFs {
    /// Creates an adapter with empty caches for the repository at `prefix`.
    pub fn new(store: Arc<dyn ObjectStore>, prefix: RepoPrefix) -> Self {
        Self {
            store,
            prefix,
            files: Mutex::new(HashMap::new()),
            listings: Mutex::new(HashMap::new()),
            dirs: Mutex::new(HashSet::new()),
        }
    }

    /// Returns the repository prefix.
    pub fn prefix(&self) -> &RepoPrefix {
        &self.prefix
    }

    /// Number of keys currently held in the file cache (including tombstones).
    pub fn cached_files(&self) -> usize {
        self.files.lock().len()
    }

    fn cached(&self, key: &str) -> Option<CacheEntry> {
        self.files.lock().get(key).cloned()
    }

    fn remember(&self, key: &str, entry: CacheEntry) {
        self.files.lock().insert(key.to_string(), entry);
    }

    fn is_marked_dir(&self, key: &str) -> bool {
        self.dirs.lock().contains(key)
    }

    /// Raw store keys under `dir_key/`, from the listing cache when possible.
    async fn raw_keys_under(&self, dir_key: &str) -> Result<Vec<String>> {
        let list_prefix = child_prefix(dir_key);
        if let Some(keys) = self.listings.lock().get(&list_prefix).cloned() {
            trace!(prefix = %list_prefix, "listing cache hit");
            return Ok(keys);
        }
        let keys = self.store.list(&list_prefix).await?;
        self.listings.lock().insert(list_prefix, keys.clone());
        Ok(keys)
    }

    /// Every key known to exist under `dir_key/`: store keys minus tombstones,
    /// plus files written through this instance.
    async fn live_keys_under(&self, dir_key: &str) -> Result<BTreeSet<String>> {
        let list_prefix = child_prefix(dir_key);
        let raw = self.raw_keys_under(dir_key).await?;
        let files = self.files.lock();
        let mut keys: BTreeSet<String> = raw
            .into_iter()
            .filter(|k| !matches!(files.get(k), Some(CacheEntry::Tombstone)))
            .collect();
        for (key, entry) in files.iter() {
            if matches!(entry, CacheEntry::Present(_)) && key.starts_with(&list_prefix) {
                keys.insert(key.clone());
            }
        }
        Ok(keys)
    }

    fn marked_dirs_under(&self, dir_key: &str) -> Vec<String> {
        let list_prefix = child_prefix(dir_key);
        self.dirs
            .lock()
            .iter()
            .filter(|d| d.starts_with(&list_prefix))
            .cloned()
            .collect()
    }
}

/// `"a/b"` -> `"a/b/"`; the empty root stays empty.
fn child_prefix(dir_key: &str) -> String {
    if dir_key.is_empty() {
        String::new()
    } else {
        format!("{}/", dir_key)
    }
}

/// First path segment of `key` after `list_prefix`.
fn first_segment<'a>(key: &'a str, list_prefix: &str) -> Option<&'a str> {
    key.strip_prefix(list_prefix)
        .and_then(|rest| rest.split('/').next())
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl FileSystem for ObjectStoreFs {
    async fn read(&self, path: &str) -> Result<Bytes> {
        let key = self.prefix.key_for(path);
        match self.cached(&key) {
            Some(CacheEntry::Present(data)) => return Ok(data),
            Some(CacheEntry::Tombstone) => return Err(StorageError::NotFound(path.to_string())),
            None => {}
        }

        match self.store.get(&key).await? {
            Some(data) => {
                self.remember(&key, CacheEntry::Present(data.clone()));
                Ok(data)
            }
            None => {
                self.remember(&key, CacheEntry::Tombstone);
                Err(StorageError::NotFound(path.to_string()))
            }
        }
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        let key = self.prefix.key_for(path);
        self.store.put(&key, data.clone()).await?;
        self.remember(&key, CacheEntry::Present(data));
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let key = self.prefix.key_for(path);
        self.store.delete(&key).await?;
        self.remember(&key, CacheEntry::Tombstone);
        Ok(())
    }

    async fn list(&self, dir: &str) -> Result<Vec<String>> {
        let dir_key = self.prefix.key_for(dir);
        let list_prefix = child_prefix(&dir_key);

        let mut names = BTreeSet::new();
        for key in self.live_keys_under(&dir_key).await? {
            if let Some(name) = first_segment(&key, &list_prefix) {
                names.insert(name.to_string());
            }
        }
        for marked in self.marked_dirs_under(&dir_key) {
            if let Some(name) = first_segment(&marked, &list_prefix) {
                names.insert(name.to_string());
            }
        }
        Ok(names.into_iter().collect())
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let key = self.prefix.key_for(path);
        self.dirs.lock().insert(key);
        Ok(())
    }

    async fn rmdir(&self, path: &str, recursive: bool) -> Result<()> {
        let dir_key = self.prefix.key_for(path);
        if !recursive {
            self.dirs.lock().remove(&dir_key);
            return Ok(());
        }

        let list_prefix = child_prefix(&dir_key);
        let mut keys: BTreeSet<String> = self.store.list(&list_prefix).await?.into_iter().collect();
        {
            let files = self.files.lock();
            for (key, entry) in files.iter() {
                if matches!(entry, CacheEntry::Present(_)) && key.starts_with(&list_prefix) {
                    keys.insert(key.clone());
                }
            }
        }
        let keys: Vec<String> = keys.into_iter().collect();

        let batch_size = self.store.max_batch_size().max(1);
        for chunk in keys.chunks(batch_size) {
            self.store.batch_delete(chunk).await?;
            let mut files = self.files.lock();
            for key in chunk {
                files.insert(key.clone(), CacheEntry::Tombstone);
            }
        }
        debug!(prefix = %list_prefix, deleted = keys.len(), "removed directory tree");

        self.dirs
            .lock()
            .retain(|d| d != &dir_key && !d.starts_with(&list_prefix));
        self.listings
            .lock()
            .retain(|p, _| !p.starts_with(&list_prefix));
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        let key = self.prefix.key_for(path);
        if key == self.prefix.as_str() || self.is_marked_dir(&key) {
            return Ok(Metadata::directory());
        }

        match self.cached(&key) {
            Some(CacheEntry::Present(data)) => return Ok(Metadata::file(data.len() as u64)),
            Some(CacheEntry::Tombstone) => {}
            None => match self.store.get(&key).await? {
                Some(data) => {
                    let size = data.len() as u64;
                    self.remember(&key, CacheEntry::Present(data));
                    return Ok(Metadata::file(size));
                }
                None => self.remember(&key, CacheEntry::Tombstone),
            },
        }

        if !self.live_keys_under(&key).await?.is_empty() || !self.marked_dirs_under(&key).is_empty()
        {
            return Ok(Metadata::directory());
        }
        Err(StorageError::NotFound(path.to_string()))
    }
}
