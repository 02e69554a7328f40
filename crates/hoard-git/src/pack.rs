//! Git pack file format implementation.
//!
//! Pack files are the format used by git for efficient object transfer.
//! See: https://git-scm.com/docs/pack-format
//!
//! Packs are written undeltified. Incoming packs may carry `OFS_DELTA` and
//! `REF_DELTA` entries; [`resolve_entries`] turns them back into objects.

use crate::object::{GitObject, ObjectId, ObjectType};
use crate::{GitError, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::io::{Read, Write};

/// Magic bytes at the start of a pack file.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
/// Pack file version we support.
const PACK_VERSION: u32 = 2;
/// Header (12 bytes) plus SHA-1 trailer (20 bytes).
const MIN_PACK_LEN: usize = 32;

const OBJ_OFS_DELTA: u8 = 6;
const OBJ_REF_DELTA: u8 = 7;

/// Builds a pack file from a set of objects.
pub struct PackBuilder {
    objects: Vec<GitObject>,
}

impl PackBuilder {
    /// Creates a new pack builder.
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
        }
    }

    /// Adds an object to the pack.
    pub fn add(&mut self, object: GitObject) {
        self.objects.push(object);
    }

    /// Number of objects added so far.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if no objects were added.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Builds the pack file.
    pub fn build(self) -> Result<Vec<u8>> {
        let mut pack = Vec::new();

        pack.extend_from_slice(PACK_SIGNATURE);
        pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack.extend_from_slice(&(self.objects.len() as u32).to_be_bytes());

        for object in &self.objects {
            Self::write_object(&mut pack, object)?;
        }

        let checksum = Sha1::digest(&pack);
        pack.extend_from_slice(&checksum);

        Ok(pack)
    }

    /// Writes a single object entry.
    fn write_object(pack: &mut Vec<u8>, object: &GitObject) -> Result<()> {
        write_entry_header(pack, object.object_type.pack_type(), object.data.len());

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&object.data)
            .map_err(|e| GitError::InvalidPack(e.to_string()))?;
        let compressed = encoder
            .finish()
            .map_err(|e| GitError::InvalidPack(e.to_string()))?;
        pack.extend_from_slice(&compressed);

        Ok(())
    }
}

impl Default for PackBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Type and size in variable-length encoding.
///
/// First byte: (MSB=more bytes) (3 bits type) (4 bits size), then 7 bits
/// of size per byte.
fn write_entry_header(pack: &mut Vec<u8>, type_code: u8, size: usize) {
    let mut first_byte = (type_code << 4) | ((size & 0x0F) as u8);
    let mut remaining_size = size >> 4;
    if remaining_size > 0 {
        first_byte |= 0x80;
    }
    pack.push(first_byte);

    while remaining_size > 0 {
        let mut byte = (remaining_size & 0x7F) as u8;
        remaining_size >>= 7;
        if remaining_size > 0 {
            byte |= 0x80;
        }
        pack.push(byte);
    }
}

/// One entry of a parsed pack, before delta resolution.
#[derive(Debug, Clone)]
pub struct PackEntry {
    /// Byte offset of the entry header within the pack.
    pub offset: usize,
    /// Entry contents.
    pub kind: PackEntryKind,
}

/// The three shapes a pack entry can take.
#[derive(Debug, Clone)]
pub enum PackEntryKind {
    /// A complete object.
    Base(GitObject),
    /// A delta against the entry at `base_offset` in the same pack.
    OfsDelta {
        /// Offset of the base entry.
        base_offset: usize,
        /// Delta instructions.
        delta: Vec<u8>,
    },
    /// A delta against an object named by id.
    RefDelta {
        /// Id of the base object.
        base: ObjectId,
        /// Delta instructions.
        delta: Vec<u8>,
    },
}

/// Parses a pack file into its entries.
pub struct PackParser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PackParser<'a> {
    /// Creates a new pack parser.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Validates header and trailer, then reads every entry.
    pub fn parse(&mut self) -> Result<Vec<PackEntry>> {
        if self.data.len() < MIN_PACK_LEN {
            return Err(GitError::InvalidPack("pack too small".to_string()));
        }
        if &self.data[0..4] != PACK_SIGNATURE {
            return Err(GitError::InvalidPack("invalid signature".to_string()));
        }

        let version = u32::from_be_bytes([self.data[4], self.data[5], self.data[6], self.data[7]]);
        if version != PACK_VERSION {
            return Err(GitError::InvalidPack(format!(
                "unsupported version: {}",
                version
            )));
        }

        let checksum_start = self.data.len() - 20;
        let computed = Sha1::digest(&self.data[..checksum_start]);
        if computed.as_slice() != &self.data[checksum_start..] {
            return Err(GitError::InvalidPack("checksum mismatch".to_string()));
        }

        let object_count =
            u32::from_be_bytes([self.data[8], self.data[9], self.data[10], self.data[11]]) as usize;

        self.pos = 12;
        let body = &self.data[..checksum_start];
        let mut entries = Vec::with_capacity(object_count.min(body.len()));
        for _ in 0..object_count {
            entries.push(self.parse_entry(body)?);
        }

        if self.pos != checksum_start {
            return Err(GitError::InvalidPack(format!(
                "{} trailing bytes after last entry",
                checksum_start - self.pos
            )));
        }
        Ok(entries)
    }

    fn next_byte(&mut self, body: &[u8]) -> Result<u8> {
        let byte = *body
            .get(self.pos)
            .ok_or_else(|| GitError::InvalidPack("unexpected end of pack".to_string()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn parse_entry(&mut self, body: &[u8]) -> Result<PackEntry> {
        let offset = self.pos;
        let first_byte = self.next_byte(body)?;

        let type_code = (first_byte >> 4) & 0x07;
        let mut size = (first_byte & 0x0F) as usize;
        let mut shift = 4;
        let mut byte = first_byte;
        while byte & 0x80 != 0 {
            byte = self.next_byte(body)?;
            if shift > 57 {
                return Err(GitError::InvalidPack("entry size overflow".to_string()));
            }
            size |= ((byte & 0x7F) as usize) << shift;
            shift += 7;
        }

        let kind = match type_code {
            OBJ_OFS_DELTA => {
                let distance = self.read_offset(body)?;
                let base_offset = offset.checked_sub(distance).filter(|_| distance > 0).ok_or_else(
                    || GitError::InvalidPack(format!("bad delta offset at {}", offset)),
                )?;
                let delta = self.inflate(body, size)?;
                PackEntryKind::OfsDelta { base_offset, delta }
            }
            OBJ_REF_DELTA => {
                let id_bytes = body
                    .get(self.pos..self.pos + 20)
                    .ok_or_else(|| GitError::InvalidPack("truncated base id".to_string()))?;
                let base = ObjectId::from_slice(id_bytes)?;
                self.pos += 20;
                let delta = self.inflate(body, size)?;
                PackEntryKind::RefDelta { base, delta }
            }
            code => {
                let object_type = ObjectType::from_pack_type(code)
                    .map_err(|_| GitError::InvalidPack(format!("unknown object type: {}", code)))?;
                let data = self.inflate(body, size)?;
                PackEntryKind::Base(GitObject::new(object_type, data))
            }
        };

        Ok(PackEntry { offset, kind })
    }

    fn read_offset(&mut self, body: &[u8]) -> Result<usize> {
        let mut byte = self.next_byte(body)?;
        let mut offset = (byte & 0x7F) as usize;
        while byte & 0x80 != 0 {
            byte = self.next_byte(body)?;
            offset = offset
                .checked_add(1)
                .and_then(|o| o.checked_mul(128))
                .ok_or_else(|| GitError::InvalidPack("delta offset overflow".to_string()))?
                | (byte & 0x7F) as usize;
        }
        Ok(offset)
    }

    fn inflate(&mut self, body: &[u8], size: usize) -> Result<Vec<u8>> {
        let remaining = body
            .get(self.pos..)
            .ok_or_else(|| GitError::InvalidPack("unexpected end of pack".to_string()))?;
        let mut decoder = ZlibDecoder::new(remaining);
        let mut decompressed = Vec::with_capacity(size.min(remaining.len() * 4));
        (&mut decoder)
            .take(size as u64 + 1)
            .read_to_end(&mut decompressed)
            .map_err(|e| GitError::InvalidPack(format!("decompression failed: {}", e)))?;

        if decompressed.len() != size {
            return Err(GitError::InvalidPack(format!(
                "size mismatch: expected {}, got {}",
                size,
                decompressed.len()
            )));
        }

        self.pos += decoder.total_in() as usize;
        Ok(decompressed)
    }
}

/// Resolves parsed entries into objects, in pack order.
///
/// `external` supplies `REF_DELTA` bases that are not in the pack itself
/// (thin packs). Unresolvable deltas are an error.
pub fn resolve_entries<F>(entries: Vec<PackEntry>, mut external: F) -> Result<Vec<GitObject>>
where
    F: FnMut(&ObjectId) -> Option<GitObject>,
{
    let mut resolved: Vec<Option<GitObject>> = vec![None; entries.len()];
    let mut by_offset: HashMap<usize, usize> = HashMap::new();
    let mut by_id: HashMap<ObjectId, usize> = HashMap::new();
    let mut pending = Vec::new();

    for (index, entry) in entries.into_iter().enumerate() {
        by_offset.insert(entry.offset, index);
        match entry.kind {
            PackEntryKind::Base(object) => {
                by_id.insert(object.id, index);
                resolved[index] = Some(object);
            }
            kind => pending.push((index, kind)),
        }
    }

    let mut external_bases: HashMap<ObjectId, GitObject> = HashMap::new();
    while !pending.is_empty() {
        let before = pending.len();
        let mut still_pending = Vec::new();

        for (index, kind) in pending {
            let base = match &kind {
                PackEntryKind::OfsDelta { base_offset, .. } => by_offset
                    .get(base_offset)
                    .and_then(|&i| resolved[i].as_ref())
                    .cloned(),
                PackEntryKind::RefDelta { base, .. } => {
                    match by_id.get(base).and_then(|&i| resolved[i].as_ref()) {
                        Some(object) => Some(object.clone()),
                        None => external_bases.get(base).cloned(),
                    }
                }
                PackEntryKind::Base(_) => None,
            };

            match (base, &kind) {
                (
                    Some(base),
                    PackEntryKind::OfsDelta { delta, .. } | PackEntryKind::RefDelta { delta, .. },
                ) => {
                    let data = apply_delta(&base.data, delta)?;
                    let object = GitObject::new(base.object_type, data);
                    by_id.insert(object.id, index);
                    resolved[index] = Some(object);
                }
                _ => still_pending.push((index, kind)),
            }
        }

        if still_pending.len() == before {
            // No in-pack progress; ask for missing bases once before giving up.
            let mut fetched = false;
            for (_, kind) in &still_pending {
                if let PackEntryKind::RefDelta { base, .. } = kind {
                    if !external_bases.contains_key(base) {
                        if let Some(object) = external(base) {
                            external_bases.insert(*base, object);
                            fetched = true;
                        }
                    }
                }
            }
            if !fetched {
                let missing = match &still_pending[0].1 {
                    PackEntryKind::RefDelta { base, .. } => base.to_hex(),
                    PackEntryKind::OfsDelta { base_offset, .. } => format!("offset {}", base_offset),
                    PackEntryKind::Base(object) => object.id.to_hex(),
                };
                return Err(GitError::ObjectNotFound(format!("delta base {}", missing)));
            }
        }
        pending = still_pending;
    }

    resolved
        .into_iter()
        .map(|o| o.ok_or_else(|| GitError::InvalidPack("unresolved entry".to_string())))
        .collect()
}

/// Applies git delta instructions to `base`.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let mut pos = 0;
    let base_size = read_delta_size(delta, &mut pos)?;
    if base_size != base.len() {
        return Err(GitError::InvalidPack(format!(
            "delta base size mismatch: expected {}, got {}",
            base_size,
            base.len()
        )));
    }
    let result_size = read_delta_size(delta, &mut pos)?;

    let mut result = Vec::with_capacity(result_size.min(delta.len().saturating_mul(64)));
    let byte_at = |pos: &mut usize| -> Result<usize> {
        let b = *delta
            .get(*pos)
            .ok_or_else(|| GitError::InvalidPack("truncated delta".to_string()))?;
        *pos += 1;
        Ok(b as usize)
    };

    while pos < delta.len() {
        let cmd = byte_at(&mut pos)?;
        if cmd & 0x80 != 0 {
            let mut offset = 0usize;
            let mut size = 0usize;
            for (bit, shift) in [(0x01, 0), (0x02, 8), (0x04, 16), (0x08, 24)] {
                if cmd & bit != 0 {
                    offset |= byte_at(&mut pos)? << shift;
                }
            }
            for (bit, shift) in [(0x10, 0), (0x20, 8), (0x40, 16)] {
                if cmd & bit != 0 {
                    size |= byte_at(&mut pos)? << shift;
                }
            }
            if size == 0 {
                size = 0x10000;
            }
            let chunk = offset
                .checked_add(size)
                .and_then(|end| base.get(offset..end))
                .ok_or_else(|| GitError::InvalidPack("delta copy out of bounds".to_string()))?;
            result.extend_from_slice(chunk);
        } else if cmd != 0 {
            let chunk = delta
                .get(pos..pos + cmd)
                .ok_or_else(|| GitError::InvalidPack("delta insert out of bounds".to_string()))?;
            result.extend_from_slice(chunk);
            pos += cmd;
        } else {
            return Err(GitError::InvalidPack("invalid delta command".to_string()));
        }
    }

    if result.len() != result_size {
        return Err(GitError::InvalidPack(format!(
            "delta result size mismatch: expected {}, got {}",
            result_size,
            result.len()
        )));
    }
    Ok(result)
}

fn read_delta_size(data: &[u8], pos: &mut usize) -> Result<usize> {
    let mut size = 0usize;
    let mut shift = 0;
    loop {
        let byte = *data
            .get(*pos)
            .ok_or_else(|| GitError::InvalidPack("truncated delta header".to_string()))?;
        *pos += 1;
        if shift > 57 {
            return Err(GitError::InvalidPack("delta size overflow".to_string()));
        }
        size |= ((byte & 0x7F) as usize) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok(size);
        }
    }
}

/// Parses and fully resolves a pack whose deltas only reference its own objects.
pub fn parse_pack(data: &[u8]) -> Result<Vec<GitObject>> {
    let entries = PackParser::new(data).parse()?;
    resolve_entries(entries, |_| None)
}
