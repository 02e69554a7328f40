//! Storage for Hoard.
//!
//! This crate provides the object-store contract with in-memory and
//! directory-backed implementations, plus the filesystem adapter that lets a
//! bare git repository live inside an object store.

mod backend;
mod disk;
mod error;
mod fs;
mod key;
mod local;
mod memory;
mod vfs;

pub use backend::{ListPage, ObjectStore, DEFAULT_MAX_BATCH_SIZE};
pub use disk::DiskFs;
pub use error::{Result, StorageError};
pub use fs::{parent_dirs, FileKind, FileSystem, Metadata};
pub use key::{normalize, RepoPrefix};
pub use local::LocalStore;
pub use memory::{MemoryStore, DEFAULT_PAGE_SIZE};
pub use vfs::ObjectStoreFs;
