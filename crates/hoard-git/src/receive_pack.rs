//! `git-receive-pack`: ingest a push.
//!
//! The request body is a run of ref-update commands followed by a pack. The
//! pack is stored content-addressed, indexed through the object engine, and
//! then each ref is updated on its own. Updates are not transactional and the
//! client-claimed old value is not compared against the stored one.

use crate::advertise::ProtocolSettings;
use crate::engine::GitObjectEngine;
use crate::object::{is_hex_oid, ObjectId};
use crate::pack::PACK_SIGNATURE;
use crate::pktline::{decode_lines, PktLineWriter};
use crate::{GitError, Result};
use bytes::Bytes;
use hoard_storage::{parent_dirs, FileSystem};
use sha1::{Digest, Sha1};
use tracing::{debug, info, warn};

/// Longest reason text put on a status line.
const MAX_REASON_LEN: usize = 512;

/// A ref update command from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Old object ID (zeros for create).
    pub old_id: ObjectId,
    /// New object ID (zeros for delete).
    pub new_id: ObjectId,
    /// Reference name.
    pub ref_name: String,
}

impl Command {
    /// Parses `<old> <new> <ref>[\0capabilities]`.
    ///
    /// Returns `None` unless both ids are 40 hex digits and a ref name follows.
    pub fn parse_line(line: &[u8]) -> Option<Self> {
        let line = line.split(|&b| b == 0).next().unwrap_or(line);
        let line = std::str::from_utf8(line).ok()?.trim_end();
        let mut parts = line.splitn(3, ' ');
        let old = parts.next()?;
        let new = parts.next()?;
        let ref_name = parts.next()?.trim();
        if !is_hex_oid(old) || !is_hex_oid(new) || ref_name.is_empty() {
            return None;
        }
        Some(Self {
            old_id: ObjectId::from_hex(&old.to_ascii_lowercase()).ok()?,
            new_id: ObjectId::from_hex(&new.to_ascii_lowercase()).ok()?,
            ref_name: ref_name.to_string(),
        })
    }

    /// Checks if this is a create command.
    pub fn is_create(&self) -> bool {
        self.old_id.is_zero()
    }

    /// Checks if this is a delete command.
    pub fn is_delete(&self) -> bool {
        self.new_id.is_zero()
    }
}

/// Parses the command section of a push body.
pub fn parse_commands(section: &[u8]) -> Vec<Command> {
    decode_lines(section)
        .iter()
        .filter_map(|line| Command::parse_line(line))
        .collect()
}

/// Offset of the first `PACK` signature in `body`, if any.
///
/// The scan is literal, so the marker appearing inside the command section
/// would be taken as the start of the pack.
pub fn find_pack_signature(body: &[u8]) -> Option<usize> {
    body.windows(PACK_SIGNATURE.len())
        .position(|w| w == PACK_SIGNATURE)
}

/// Checks a ref name against git's ref-format rules.
///
/// Pushed names must live under `refs/`.
pub fn validate_ref_name(name: &str) -> Result<()> {
    let fail = |reason: &str| Err(GitError::InvalidRef(format!("{}: {}", name, reason)));

    if !name.starts_with("refs/") {
        return fail("must start with refs/");
    }
    if name.ends_with('/') || name.contains("//") {
        return fail("empty path component");
    }
    if name.contains("..") {
        return fail("cannot contain ..");
    }
    if name.contains("@{") {
        return fail("cannot contain @{");
    }
    if name.ends_with('.') || name.ends_with(".lock") {
        return fail("bad suffix");
    }
    if name
        .split('/')
        .any(|component| component.starts_with('.') || component.ends_with(".lock"))
    {
        return fail("bad path component");
    }
    if let Some(c) = name.chars().find(|&c| {
        c.is_control() || matches!(c, ' ' | '~' | '^' | ':' | '?' | '*' | '[' | '\\')
    }) {
        return fail(&format!("invalid character {:?}", c));
    }
    Ok(())
}

/// Repository path of a pack: `objects/pack/pack-<sha1 of bytes>.pack`.
pub fn pack_path(pack: &[u8]) -> String {
    format!("objects/pack/pack-{}.pack", hex::encode(Sha1::digest(pack)))
}

/// Outcome of unpacking the pushed pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnpackStatus {
    /// Pack stored and indexed (or there was none).
    Ok,
    /// Storing or indexing failed; no ref was touched.
    Failed(String),
}

/// Result of one ref update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefStatus {
    /// Ref the command named.
    pub ref_name: String,
    /// Failure reason, or `None` on success.
    pub error: Option<String>,
}

/// The `report-status` answer to a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveReport {
    /// Unpack outcome.
    pub unpack: UnpackStatus,
    /// Per-command outcomes, in command order.
    pub refs: Vec<RefStatus>,
}

fn clip(reason: &str) -> String {
    let single_line = reason.replace('\n', " ");
    match single_line.char_indices().nth(MAX_REASON_LEN) {
        Some((idx, _)) => single_line[..idx].to_string(),
        None => single_line,
    }
}

impl ReceiveReport {
    fn unpack_failed(reason: &str) -> Self {
        Self {
            unpack: UnpackStatus::Failed(clip(reason)),
            refs: Vec::new(),
        }
    }

    /// Returns true if unpacking and every ref update succeeded.
    pub fn is_success(&self) -> bool {
        self.unpack == UnpackStatus::Ok && self.refs.iter().all(|r| r.error.is_none())
    }

    /// Encodes the report as pkt-lines terminated by a flush.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut writer = PktLineWriter::new(Vec::new());
        match &self.unpack {
            UnpackStatus::Ok => writer.write_line("unpack ok")?,
            UnpackStatus::Failed(reason) => {
                writer.write_line(&format!("ng unpack error {}", reason))?
            }
        }
        for status in &self.refs {
            match &status.error {
                None => writer.write_line(&format!("ok {}", status.ref_name))?,
                Some(reason) => {
                    writer.write_line(&format!("ng {} {}", status.ref_name, reason))?
                }
            }
        }
        writer.flush_pkt()?;
        Ok(writer.into_inner())
    }
}

async fn store_pack(
    fs: &dyn FileSystem,
    engine: &dyn GitObjectEngine,
    pack: &[u8],
) -> Result<usize> {
    let path = pack_path(pack);
    for dir in parent_dirs(&path) {
        fs.mkdir(&dir).await?;
    }
    fs.write(&path, Bytes::copy_from_slice(pack)).await?;
    let ids = engine.index_pack(&path).await?;
    Ok(ids.len())
}

async fn apply_command(fs: &dyn FileSystem, command: &Command) -> Result<()> {
    validate_ref_name(&command.ref_name)?;
    if command.is_delete() {
        match fs.delete(&command.ref_name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    } else {
        for dir in parent_dirs(&command.ref_name) {
            fs.mkdir(&dir).await?;
        }
        fs.write(
            &command.ref_name,
            Bytes::from(format!("{}\n", command.new_id)),
        )
        .await?;
        Ok(())
    }
}

fn failure_reason(err: &GitError) -> String {
    match err {
        GitError::InvalidRef(_) => "funny refname".to_string(),
        other => clip(&other.to_string()),
    }
}

/// Processes a push body and returns the status report.
///
/// `fs` and `engine` must view the same repository.
pub async fn receive_pack(
    fs: &dyn FileSystem,
    engine: &dyn GitObjectEngine,
    body: &[u8],
    settings: &ProtocolSettings,
) -> ReceiveReport {
    let Some(pack_start) = find_pack_signature(body) else {
        debug!("no pack in push body");
        return ReceiveReport {
            unpack: UnpackStatus::Ok,
            refs: Vec::new(),
        };
    };

    let commands = parse_commands(&body[..pack_start]);
    let pack = &body[pack_start..];

    match store_pack(fs, engine, pack).await {
        Ok(objects) => debug!(objects, bytes = pack.len(), "stored pushed pack"),
        Err(e) => {
            warn!(error = %e, "failed to unpack push");
            return ReceiveReport::unpack_failed(&e.to_string());
        }
    }

    let mut refs = Vec::with_capacity(commands.len());
    for command in &commands {
        let error = match apply_command(fs, command).await {
            Ok(()) => {
                info!(
                    ref_name = %command.ref_name,
                    old = %command.old_id,
                    new = %command.new_id,
                    "updated ref"
                );
                None
            }
            Err(e) => {
                warn!(ref_name = %command.ref_name, error = %e, "ref update failed");
                Some(failure_reason(&e))
            }
        };
        refs.push(RefStatus {
            ref_name: command.ref_name.clone(),
            error,
        });
    }

    if refs.iter().any(|r| r.error.is_none()) {
        if let Err(e) = ensure_head(fs, settings).await {
            warn!(error = %e, "failed to initialise HEAD");
        }
    }

    ReceiveReport {
        unpack: UnpackStatus::Ok,
        refs,
    }
}

async fn ensure_head(fs: &dyn FileSystem, settings: &ProtocolSettings) -> Result<()> {
    if fs.read_optional("HEAD").await?.is_none() {
        fs.write(
            "HEAD",
            Bytes::from(format!("ref: refs/heads/{}\n", settings.default_branch)),
        )
        .await?;
        debug!(branch = %settings.default_branch, "initialised HEAD");
    }
    Ok(())
}
