//! The git object engine.
//!
//! Protocol handlers never touch object files directly; they go through
//! [`GitObjectEngine`]. [`FsObjectEngine`] implements it on top of any
//! [`FileSystem`], storing objects loose and refs as plain files.

use crate::object::{parse_tree, GitObject, ObjectId, ObjectType, TreeEntry};
use crate::pack::{resolve_entries, PackBuilder, PackEntryKind, PackParser};
use crate::{GitError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use hoard_storage::{parent_dirs, FileSystem};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Symbolic refs are followed at most this many times.
pub const MAX_SYMREF_DEPTH: usize = 5;

/// Object and ref access for one repository.
#[async_trait]
pub trait GitObjectEngine: Send + Sync {
    /// Resolves a ref (`HEAD`, `refs/heads/main`, ...) to an object id.
    ///
    /// Returns `None` when the ref does not exist.
    async fn resolve_ref(&self, name: &str) -> Result<Option<ObjectId>>;

    /// Returns the ref `HEAD` points at when it is symbolic.
    async fn head_target(&self) -> Result<Option<String>>;

    /// Full names of every branch (`refs/heads/...`), sorted.
    async fn list_branches(&self) -> Result<Vec<String>>;

    /// Full names of every tag (`refs/tags/...`), sorted.
    async fn list_tags(&self) -> Result<Vec<String>>;

    /// Reads an object by id.
    async fn read_object(&self, id: &ObjectId) -> Result<GitObject>;

    /// Writes a pack holding `ids` in the given order.
    async fn build_pack(&self, ids: &[ObjectId]) -> Result<Vec<u8>>;

    /// Indexes the pack stored at `pack_path`, making its objects readable.
    async fn index_pack(&self, pack_path: &str) -> Result<Vec<ObjectId>>;

    /// Reads and parses a tree object.
    async fn read_tree(&self, id: &ObjectId) -> Result<Vec<TreeEntry>> {
        let object = self.read_object(id).await?;
        if object.object_type != ObjectType::Tree {
            return Err(GitError::InvalidObject(format!("{} is not a tree", id)));
        }
        parse_tree(&object.data)
    }

    /// Reads the content of a blob.
    async fn read_blob(&self, id: &ObjectId) -> Result<Bytes> {
        let object = self.read_object(id).await?;
        if object.object_type != ObjectType::Blob {
            return Err(GitError::InvalidObject(format!("{} is not a blob", id)));
        }
        Ok(object.data)
    }
}

#[async_trait]
impl<T: GitObjectEngine + ?Sized> GitObjectEngine for Arc<T> {
    async fn resolve_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        (**self).resolve_ref(name).await
    }

    async fn head_target(&self) -> Result<Option<String>> {
        (**self).head_target().await
    }

    async fn list_branches(&self) -> Result<Vec<String>> {
        (**self).list_branches().await
    }

    async fn list_tags(&self) -> Result<Vec<String>> {
        (**self).list_tags().await
    }

    async fn read_object(&self, id: &ObjectId) -> Result<GitObject> {
        (**self).read_object(id).await
    }

    async fn build_pack(&self, ids: &[ObjectId]) -> Result<Vec<u8>> {
        (**self).build_pack(ids).await
    }

    async fn index_pack(&self, pack_path: &str) -> Result<Vec<ObjectId>> {
        (**self).index_pack(pack_path).await
    }
}

/// A [`GitObjectEngine`] over a bare-repository layout on a [`FileSystem`].
pub struct FsObjectEngine {
    fs: Arc<dyn FileSystem>,
}

impl FsObjectEngine {
    /// Creates an engine for the repository behind `fs`.
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Returns the underlying filesystem.
    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Stores an object loose. Objects already present are not rewritten.
    pub async fn write_object(&self, object: &GitObject) -> Result<ObjectId> {
        let path = object.id.loose_path();
        if self.fs.read_optional(&path).await?.is_some() {
            return Ok(object.id);
        }
        for dir in parent_dirs(&path) {
            self.fs.mkdir(&dir).await?;
        }
        self.fs.write(&path, Bytes::from(object.to_loose()?)).await?;
        Ok(object.id)
    }

    /// Points `name` at `id`, creating parent directories.
    pub async fn write_ref(&self, name: &str, id: &ObjectId) -> Result<()> {
        for dir in parent_dirs(name) {
            self.fs.mkdir(&dir).await?;
        }
        self.fs
            .write(name, Bytes::from(format!("{}\n", id)))
            .await?;
        Ok(())
    }

    /// Makes `name` a symbolic ref to `target`.
    pub async fn write_symbolic_ref(&self, name: &str, target: &str) -> Result<()> {
        self.fs
            .write(name, Bytes::from(format!("ref: {}\n", target)))
            .await?;
        Ok(())
    }

    async fn packed_refs(&self) -> Result<Vec<(String, ObjectId)>> {
        let Some(data) = self.fs.read_optional("packed-refs").await? else {
            return Ok(Vec::new());
        };
        let text = String::from_utf8_lossy(&data);
        let refs = text
            .lines()
            .filter(|l| !l.starts_with('#') && !l.starts_with('^'))
            .filter_map(|l| {
                let (hex, name) = l.split_once(' ')?;
                Some((name.trim().to_string(), ObjectId::from_hex(hex).ok()?))
            })
            .collect();
        Ok(refs)
    }

    async fn list_ref_files(&self, root: &str) -> Result<Vec<String>> {
        let mut found = Vec::new();
        let mut stack = vec![root.to_string()];
        while let Some(dir) = stack.pop() {
            for name in self.fs.list(&dir).await? {
                let path = format!("{}/{}", dir, name);
                match self.fs.stat(&path).await {
                    Ok(meta) if meta.is_dir() => stack.push(path),
                    Ok(_) => found.push(path),
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(found)
    }

    async fn list_refs(&self, root: &str) -> Result<Vec<String>> {
        let mut names: BTreeSet<String> = self.list_ref_files(root).await?.into_iter().collect();
        let prefix = format!("{}/", root);
        for (name, _) in self.packed_refs().await? {
            if name.starts_with(&prefix) {
                names.insert(name);
            }
        }
        Ok(names.into_iter().collect())
    }
}

#[async_trait]
impl GitObjectEngine for FsObjectEngine {
    async fn resolve_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        let mut current = name.to_string();
        for _ in 0..=MAX_SYMREF_DEPTH {
            match self.fs.read_optional(&current).await? {
                Some(data) => {
                    let text = String::from_utf8_lossy(&data);
                    let text = text.trim();
                    if let Some(target) = text.strip_prefix("ref:") {
                        current = target.trim().to_string();
                        continue;
                    }
                    return ObjectId::from_hex(text).map(Some).map_err(|_| {
                        GitError::InvalidRef(format!("{} holds {:?}", current, text))
                    });
                }
                None => {
                    let packed = self.packed_refs().await?;
                    return Ok(packed
                        .into_iter()
                        .find(|(n, _)| *n == current)
                        .map(|(_, id)| id));
                }
            }
        }
        Err(GitError::InvalidRef(format!(
            "{}: symbolic ref chain longer than {}",
            name, MAX_SYMREF_DEPTH
        )))
    }

    async fn head_target(&self) -> Result<Option<String>> {
        let Some(data) = self.fs.read_optional("HEAD").await? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&data);
        Ok(text
            .trim()
            .strip_prefix("ref:")
            .map(|t| t.trim().to_string()))
    }

    async fn list_branches(&self) -> Result<Vec<String>> {
        self.list_refs("refs/heads").await
    }

    async fn list_tags(&self) -> Result<Vec<String>> {
        self.list_refs("refs/tags").await
    }

    async fn read_object(&self, id: &ObjectId) -> Result<GitObject> {
        let data = match self.fs.read(&id.loose_path()).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => return Err(GitError::ObjectNotFound(id.to_hex())),
            Err(e) => return Err(e.into()),
        };
        let object = GitObject::from_loose(&data)?;
        if object.id != *id {
            return Err(GitError::InvalidObject(format!(
                "{} hashes to {}",
                id, object.id
            )));
        }
        Ok(object)
    }

    async fn build_pack(&self, ids: &[ObjectId]) -> Result<Vec<u8>> {
        let mut builder = PackBuilder::new();
        for id in ids {
            builder.add(self.read_object(id).await?);
        }
        builder.build()
    }

    #[instrument(skip(self))]
    async fn index_pack(&self, pack_path: &str) -> Result<Vec<ObjectId>> {
        let data = self.fs.read(pack_path).await?;
        let entries = PackParser::new(&data).parse()?;

        // Thin packs name bases that only the repository has.
        let in_pack: HashSet<ObjectId> = entries
            .iter()
            .filter_map(|e| match &e.kind {
                PackEntryKind::Base(object) => Some(object.id),
                _ => None,
            })
            .collect();
        let mut external = HashMap::new();
        for entry in &entries {
            if let PackEntryKind::RefDelta { base, .. } = &entry.kind {
                if in_pack.contains(base) || external.contains_key(base) {
                    continue;
                }
                match self.read_object(base).await {
                    Ok(object) => {
                        external.insert(*base, object);
                    }
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
            }
        }

        let objects = resolve_entries(entries, |id| external.get(id).cloned())?;
        let mut ids = Vec::with_capacity(objects.len());
        for object in &objects {
            ids.push(self.write_object(object).await?);
        }
        debug!(pack = pack_path, objects = ids.len(), "indexed pack");
        Ok(ids)
    }
}
