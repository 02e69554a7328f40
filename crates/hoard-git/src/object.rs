//! Git object types and utilities.

use crate::{GitError, Result};
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};
use std::fmt;
use std::io::{Read, Write};

/// A 20-byte SHA-1 object identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// The all-zero id, meaning "absent" in ref update commands.
    pub const ZERO: ObjectId = ObjectId([0u8; 20]);

    /// Creates an ObjectId from raw bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Creates an ObjectId from a 20-byte slice.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; 20] = slice.try_into().map_err(|_| {
            GitError::InvalidObject(format!("invalid object id length: {}", slice.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Creates an ObjectId from a hex string.
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != 40 {
            return Err(GitError::InvalidObject(format!(
                "invalid object id length: {}",
                hex.len()
            )));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex, &mut bytes)
            .map_err(|e| GitError::InvalidObject(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns the lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns true for the all-zero id.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Repository path of the loose object: `objects/xx/yyyy...`.
    pub fn loose_path(&self) -> String {
        let hex = self.to_hex();
        format!("objects/{}/{}", &hex[..2], &hex[2..])
    }

    /// Computes the SHA-1 hash of data with a git object header.
    pub fn hash_object(object_type: ObjectType, data: &[u8]) -> Self {
        let header = format!("{} {}\0", object_type.as_str(), data.len());
        let mut hasher = Sha1::new();
        hasher.update(header.as_bytes());
        hasher.update(data);
        let result = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&result);
        Self(bytes)
    }
}

/// Returns true if `s` is exactly 40 hex digits.
pub fn is_hex_oid(s: &str) -> bool {
    s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Git object types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    /// File content.
    Blob,
    /// Directory listing.
    Tree,
    /// Commit object.
    Commit,
    /// Annotated tag.
    Tag,
}

impl ObjectType {
    /// Returns the string representation used in git.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    /// Parses an object type from a string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blob" => Ok(Self::Blob),
            "tree" => Ok(Self::Tree),
            "commit" => Ok(Self::Commit),
            "tag" => Ok(Self::Tag),
            _ => Err(GitError::InvalidObject(format!(
                "unknown object type: {}",
                s
            ))),
        }
    }

    /// Returns the type code used in pack files.
    pub fn pack_type(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
        }
    }

    /// Parses an object type from a pack file type code.
    pub fn from_pack_type(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Self::Commit),
            2 => Ok(Self::Tree),
            3 => Ok(Self::Blob),
            4 => Ok(Self::Tag),
            _ => Err(GitError::InvalidObject(format!(
                "unknown pack type: {}",
                code
            ))),
        }
    }
}

/// A git object (blob, tree, commit, or tag).
#[derive(Debug, Clone)]
pub struct GitObject {
    /// The object's unique identifier (SHA-1 hash).
    pub id: ObjectId,
    /// The type of object.
    pub object_type: ObjectType,
    /// The raw object data (uncompressed).
    pub data: Bytes,
}

impl GitObject {
    /// Creates a new git object, computing its ID from the data.
    pub fn new(object_type: ObjectType, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let id = ObjectId::hash_object(object_type, &data);
        Self {
            id,
            object_type,
            data,
        }
    }

    /// Creates a blob object from file content.
    pub fn blob(content: impl Into<Bytes>) -> Self {
        Self::new(ObjectType::Blob, content)
    }

    /// Creates a tree object from its entries, sorted the way git sorts them.
    pub fn tree(entries: &[TreeEntry]) -> Self {
        let mut sorted: Vec<&TreeEntry> = entries.iter().collect();
        sorted.sort_by_key(|e| e.sort_key());
        let mut data = Vec::new();
        for entry in sorted {
            data.extend_from_slice(format!("{:o} {}\0", entry.mode, entry.name).as_bytes());
            data.extend_from_slice(entry.id.as_bytes());
        }
        Self::new(ObjectType::Tree, data)
    }

    /// Creates a commit object.
    pub fn commit(
        tree_id: &ObjectId,
        parents: &[ObjectId],
        author: &str,
        committer: &str,
        message: &str,
    ) -> Self {
        let mut content = format!("tree {}\n", tree_id);
        for parent in parents {
            content.push_str(&format!("parent {}\n", parent));
        }
        content.push_str(&format!("author {}\n", author));
        content.push_str(&format!("committer {}\n", committer));
        content.push_str(&format!("\n{}", message));
        Self::new(ObjectType::Commit, content.into_bytes())
    }

    /// Creates an annotated tag object.
    pub fn tag(target: &ObjectId, target_type: ObjectType, name: &str, tagger: &str, message: &str) -> Self {
        let content = format!(
            "object {}\ntype {}\ntag {}\ntagger {}\n\n{}",
            target,
            target_type.as_str(),
            name,
            tagger,
            message
        );
        Self::new(ObjectType::Tag, content.into_bytes())
    }

    /// Returns the size of the object data.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Returns the objects this object points at, in git's order.
    ///
    /// Commits yield their tree then parents, annotated tags their target.
    /// Tree entries are returned by [`parse_tree`] instead.
    pub fn header_links(&self) -> Vec<ObjectId> {
        let keys: &[&str] = match self.object_type {
            ObjectType::Commit => &["tree ", "parent "],
            ObjectType::Tag => &["object "],
            _ => return Vec::new(),
        };
        let text = String::from_utf8_lossy(&self.data);
        let mut links = Vec::new();
        for line in text.lines() {
            if line.is_empty() {
                break;
            }
            for key in keys {
                if let Some(hex) = line.strip_prefix(key) {
                    if let Ok(id) = ObjectId::from_hex(hex.trim()) {
                        links.push(id);
                    }
                }
            }
        }
        links
    }

    /// Encodes the object in loose format: zlib(`<type> <size>\0<data>`).
    pub fn to_loose(&self) -> Result<Vec<u8>> {
        let header = format!("{} {}\0", self.object_type.as_str(), self.data.len());
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(header.as_bytes())?;
        encoder.write_all(&self.data)?;
        Ok(encoder.finish()?)
    }

    /// Decodes a loose object, validating the header.
    pub fn from_loose(compressed: &[u8]) -> Result<Self> {
        let mut decoder = ZlibDecoder::new(compressed);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| GitError::InvalidObject(format!("decompression failed: {}", e)))?;

        let null_pos = decompressed
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| GitError::InvalidObject("missing null byte in header".to_string()))?;

        let header = String::from_utf8_lossy(&decompressed[..null_pos]);
        let (kind, size) = header
            .split_once(' ')
            .ok_or_else(|| GitError::InvalidObject(format!("invalid header: {}", header)))?;
        let object_type = ObjectType::parse(kind)?;
        let size: usize = size
            .parse()
            .map_err(|_| GitError::InvalidObject("invalid size".to_string()))?;

        let data = &decompressed[null_pos + 1..];
        if data.len() != size {
            return Err(GitError::InvalidObject(format!(
                "size mismatch: header says {}, found {}",
                size,
                data.len()
            )));
        }
        Ok(GitObject::new(object_type, Bytes::copy_from_slice(data)))
    }
}

/// Tree entry mode for submodules; such entries point into another repository.
pub const MODE_GITLINK: u32 = 0o160000;
/// Tree entry mode for subdirectories.
pub const MODE_TREE: u32 = 0o040000;
/// Tree entry mode for regular files.
pub const MODE_FILE: u32 = 0o100644;

/// One entry of a tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Octal file mode.
    pub mode: u32,
    /// Entry name.
    pub name: String,
    /// Target object.
    pub id: ObjectId,
}

impl TreeEntry {
    /// Creates a tree entry.
    pub fn new(mode: u32, name: impl Into<String>, id: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            id,
        }
    }

    /// Returns true for submodule entries.
    pub fn is_gitlink(&self) -> bool {
        self.mode == MODE_GITLINK
    }

    /// Returns true for subdirectory entries.
    pub fn is_tree(&self) -> bool {
        self.mode == MODE_TREE
    }

    // Git compares directory names as if they ended in '/'.
    fn sort_key(&self) -> Vec<u8> {
        let mut key = self.name.as_bytes().to_vec();
        if self.is_tree() {
            key.push(b'/');
        }
        key
    }
}

/// Parses the binary body of a tree object.
pub fn parse_tree(data: &[u8]) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let rest = &data[pos..];
        let space = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| GitError::InvalidObject("missing space in tree entry".to_string()))?;
        let mode_str = std::str::from_utf8(&rest[..space])
            .map_err(|e| GitError::InvalidObject(e.to_string()))?;
        let mode = u32::from_str_radix(mode_str, 8)
            .map_err(|_| GitError::InvalidObject(format!("invalid tree mode: {}", mode_str)))?;

        let rest = &rest[space + 1..];
        let null = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| GitError::InvalidObject("missing null in tree entry".to_string()))?;
        let name = String::from_utf8_lossy(&rest[..null]).into_owned();

        let id_bytes = rest
            .get(null + 1..null + 21)
            .ok_or_else(|| GitError::InvalidObject("truncated tree entry id".to_string()))?;
        let id = ObjectId::from_slice(id_bytes)?;

        pos += space + 1 + null + 21;
        entries.push(TreeEntry { mode, name, id });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_hex_roundtrip() {
        let hex = "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3";
        let id = ObjectId::from_hex(hex).unwrap();
        assert_eq!(id.to_hex(), hex);
    }

    #[test]
    fn test_zero_id() {
        assert!(ObjectId::ZERO.is_zero());
        assert_eq!(ObjectId::ZERO.to_hex(), "0".repeat(40));
        assert!(!ObjectId::from_bytes([1; 20]).is_zero());
    }

    #[test]
    fn test_is_hex_oid() {
        assert!(is_hex_oid("a94a8fe5ccb19ba61c4c0873d391e987982fbbd3"));
        assert!(!is_hex_oid("a94a8fe5"));
        assert!(!is_hex_oid("zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz"));
    }

    #[test]
    fn test_loose_path() {
        let id = ObjectId::from_hex("ce013625030ba8dba906f756967f9e9ca394464a").unwrap();
        assert_eq!(
            id.loose_path(),
            "objects/ce/013625030ba8dba906f756967f9e9ca394464a"
        );
    }

    #[test]
    fn test_blob_hash() {
        let obj = GitObject::blob(b"hello\n".to_vec());
        assert_eq!(obj.id.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
    }

    #[test]
    fn test_empty_blob_hash() {
        let obj = GitObject::blob(Vec::new());
        assert_eq!(obj.id.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn test_empty_tree_hash() {
        let tree = GitObject::tree(&[]);
        assert_eq!(tree.id.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
    }

    #[test]
    fn test_object_id_invalid() {
        assert!(ObjectId::from_hex("abc").is_err());
        assert!(ObjectId::from_hex("zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz").is_err());
        assert!(ObjectId::from_slice(&[0u8; 19]).is_err());
    }

    #[test]
    fn test_object_type_pack_codes() {
        for ot in [
            ObjectType::Commit,
            ObjectType::Tree,
            ObjectType::Blob,
            ObjectType::Tag,
        ] {
            assert_eq!(ObjectType::from_pack_type(ot.pack_type()).unwrap(), ot);
            assert_eq!(ObjectType::parse(ot.as_str()).unwrap(), ot);
        }
        assert!(ObjectType::from_pack_type(0).is_err());
        assert!(ObjectType::from_pack_type(6).is_err());
    }

    #[test]
    fn test_commit_links() {
        let tree_id = ObjectId::from_bytes([1u8; 20]);
        let parents = vec![
            ObjectId::from_bytes([2u8; 20]),
            ObjectId::from_bytes([3u8; 20]),
        ];
        let commit = GitObject::commit(&tree_id, &parents, "A <a@x> 0 +0000", "A <a@x> 0 +0000", "msg\n\nparent 0000");

        assert_eq!(commit.header_links(), vec![tree_id, parents[0], parents[1]]);
    }

    #[test]
    fn test_tag_links() {
        let target = ObjectId::from_bytes([7u8; 20]);
        let tag = GitObject::tag(&target, ObjectType::Commit, "v1", "A <a@x> 0 +0000", "release\n");
        assert_eq!(tag.header_links(), vec![target]);
        assert!(GitObject::blob("object x").header_links().is_empty());
    }

    #[test]
    fn test_tree_roundtrip() {
        let entries = vec![
            TreeEntry::new(MODE_FILE, "README", ObjectId::from_bytes([1; 20])),
            TreeEntry::new(MODE_TREE, "src", ObjectId::from_bytes([2; 20])),
            TreeEntry::new(MODE_GITLINK, "vendor", ObjectId::from_bytes([3; 20])),
        ];
        let tree = GitObject::tree(&entries);
        let parsed = parse_tree(&tree.data).unwrap();

        assert_eq!(parsed, entries);
        assert!(parsed[2].is_gitlink());
        assert!(parsed[1].is_tree());
    }

    #[test]
    fn test_parse_tree_truncated() {
        let tree = GitObject::tree(&[TreeEntry::new(
            MODE_FILE,
            "a",
            ObjectId::from_bytes([1; 20]),
        )]);
        assert!(parse_tree(&tree.data[..tree.data.len() - 3]).is_err());
        assert!(parse_tree(b"100644 no-null").is_err());
    }

    #[test]
    fn test_loose_roundtrip() {
        let obj = GitObject::blob(b"loose content".to_vec());
        let encoded = obj.to_loose().unwrap();
        let decoded = GitObject::from_loose(&encoded).unwrap();

        assert_eq!(decoded.id, obj.id);
        assert_eq!(decoded.object_type, ObjectType::Blob);
        assert_eq!(decoded.data, obj.data);
    }

    #[test]
    fn test_loose_rejects_size_mismatch() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"blob 10\0short").unwrap();
        let bad = encoder.finish().unwrap();
        assert!(GitObject::from_loose(&bad).is_err());
        assert!(GitObject::from_loose(b"not zlib").is_err());
    }
}
