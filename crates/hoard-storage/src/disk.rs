//! A [`FileSystem`] over a real directory.
//!
//! Used for repositories checked out on local disk and as a reference
//! implementation of the contract in tests.

use crate::fs::{FileSystem, Metadata};
use crate::{Result, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

/// A filesystem rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct DiskFs {
    root: PathBuf,
}

impl DiskFs {
    /// Creates a filesystem rooted at `root`. The directory is not created.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let mut resolved = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if segment == ".." {
                return Err(StorageError::InvalidKey(path.to_string()));
            }
            resolved.push(segment);
        }
        Ok(resolved)
    }
}

fn not_found(path: &str, err: std::io::Error) -> StorageError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(path.to_string())
    } else {
        err.into()
    }
}

#[async_trait]
impl FileSystem for DiskFs {
    async fn read(&self, path: &str) -> Result<Bytes> {
        let full = self.resolve(path)?;
        let data = tokio::fs::read(&full).await.map_err(|e| not_found(path, e))?;
        Ok(Bytes::from(data))
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, &data).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        tokio::fs::remove_file(&full)
            .await
            .map_err(|e| not_found(path, e))
    }

    async fn list(&self, dir: &str) -> Result<Vec<String>> {
        let full = self.resolve(dir)?;
        let mut entries = match tokio::fs::read_dir(&full).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        tokio::fs::create_dir_all(&full).await?;
        Ok(())
    }

    async fn rmdir(&self, path: &str, recursive: bool) -> Result<()> {
        let full = self.resolve(path)?;
        let result = if recursive {
            tokio::fs::remove_dir_all(&full).await
        } else {
            tokio::fs::remove_dir(&full).await
        };
        result.map_err(|e| not_found(path, e))
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        let full = self.resolve(path)?;
        let meta = tokio::fs::metadata(&full)
            .await
            .map_err(|e| not_found(path, e))?;
        if meta.is_dir() {
            Ok(Metadata::directory())
        } else {
            Ok(Metadata::file(meta.len()))
        }
    }
}
