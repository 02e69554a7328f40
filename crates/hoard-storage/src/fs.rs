//! The filesystem contract the git object engine works through.
//!
//! Paths are `/`-separated and relative to the repository root. Two
//! implementations exist: [`crate::ObjectStoreFs`] maps the calls onto an
//! object store, [`crate::DiskFs`] onto a real directory.

use crate::{Result, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

/// Whether a path names a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// A regular file.
    File,
    /// A directory (real, implied by children, or marked in memory).
    Directory,
}

/// Result of [`FileSystem::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// File or directory.
    pub kind: FileKind,
    /// Byte length for files, zero for directories.
    pub size: u64,
}

impl Metadata {
    /// Metadata for a file of `size` bytes.
    pub fn file(size: u64) -> Self {
        Self {
            kind: FileKind::File,
            size,
        }
    }

    /// Metadata for a directory.
    pub fn directory() -> Self {
        Self {
            kind: FileKind::Directory,
            size: 0,
        }
    }

    /// Returns true for directories.
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// Returns true for files.
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }
}

/// POSIX-style filesystem operations over a single repository.
///
/// Absence is always reported as [`StorageError::NotFound`].
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Reads the whole file at `path`.
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Writes `data` to `path`, replacing any previous content.
    async fn write(&self, path: &str, data: Bytes) -> Result<()>;

    /// Removes the file at `path`.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Lists the names of the direct children of `dir`.
    async fn list(&self, dir: &str) -> Result<Vec<String>>;

    /// Creates the directory `path`.
    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Removes the directory `path`, and everything below it when `recursive`.
    async fn rmdir(&self, path: &str, recursive: bool) -> Result<()>;

    /// Describes `path`.
    async fn stat(&self, path: &str) -> Result<Metadata>;

    /// Symbolic links are not supported.
    async fn readlink(&self, _path: &str) -> Result<String> {
        Err(StorageError::Unsupported("readlink"))
    }

    /// Symbolic links are not supported.
    async fn symlink(&self, _target: &str, _path: &str) -> Result<()> {
        Err(StorageError::Unsupported("symlink"))
    }

    /// Returns true if `path` exists as a file or directory.
    async fn exists(&self, path: &str) -> Result<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Reads `path`, mapping absence to `None`.
    async fn read_optional(&self, path: &str) -> Result<Option<Bytes>> {
        match self.read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Returns every ancestor directory of `path`, outermost first.
///
/// `"refs/heads/feature/x"` yields `["refs", "refs/heads", "refs/heads/feature"]`.
pub fn parent_dirs(path: &str) -> Vec<String> {
    let normalized = crate::key::normalize(path);
    let segments: Vec<&str> = normalized.split('/').collect();
    (1..segments.len())
        .map(|n| segments[..n].join("/"))
        .collect()
}
