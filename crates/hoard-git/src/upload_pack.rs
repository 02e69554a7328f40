//! `git-upload-pack`: serve a pack for fetch and clone.
//!
//! Negotiation is single-round: the server reads every `want` and `have`,
//! answers `NAK`, and sends the objects reachable from the wants minus the
//! haves. No common-ancestor search is done, so clients that already hold
//! most history still receive whatever the walk reaches.

use crate::engine::GitObjectEngine;
use crate::object::{is_hex_oid, ObjectId, ObjectType};
use crate::pktline::{decode_lines, PktLineWriter, FLUSH_PKT};
use crate::Result;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

/// Wants and haves sent by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WantHave {
    /// Object IDs the client wants.
    pub wants: Vec<ObjectId>,
    /// Object IDs the client already has.
    pub haves: Vec<ObjectId>,
}

impl WantHave {
    /// Extracts `want <oid>` and `have <oid>` lines from a request body.
    ///
    /// The oid is the 40 characters after the keyword; anything after it
    /// (capabilities) and every other line is ignored.
    pub fn parse(body: &[u8]) -> Self {
        let mut result = Self::default();
        for line in decode_lines(body) {
            let Some(hex) = line.get(5..45).and_then(|h| std::str::from_utf8(h).ok()) else {
                continue;
            };
            if !is_hex_oid(hex) {
                continue;
            }
            let Ok(id) = ObjectId::from_hex(&hex.to_ascii_lowercase()) else {
                continue;
            };
            if line.starts_with(b"want ") {
                result.wants.push(id);
            } else if line.starts_with(b"have ") {
                result.haves.push(id);
            }
        }
        result
    }
}

/// Walks everything reachable from `wants`, in visit order.
///
/// Commits lead to their tree and parents, trees to their entries (except
/// submodule links), annotated tags to their target. Objects that cannot
/// be read are skipped.
pub async fn collect_reachable(
    engine: &dyn GitObjectEngine,
    wants: &[ObjectId],
) -> Vec<ObjectId> {
    let mut queue: VecDeque<ObjectId> = wants.iter().copied().collect();
    let mut visited = HashSet::new();
    let mut order = Vec::new();

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        let object = match engine.read_object(&id).await {
            Ok(object) => object,
            Err(e) => {
                debug!(object = %id, error = %e, "skipping unreadable object");
                continue;
            }
        };
        order.push(id);

        match object.object_type {
            ObjectType::Commit | ObjectType::Tag => queue.extend(object.header_links()),
            ObjectType::Tree => match crate::object::parse_tree(&object.data) {
                Ok(entries) => queue.extend(
                    entries
                        .into_iter()
                        .filter(|e| !e.is_gitlink())
                        .map(|e| e.id),
                ),
                Err(e) => debug!(object = %id, error = %e, "skipping malformed tree"),
            },
            ObjectType::Blob => {}
        }
    }

    order
}

async fn respond(engine: &dyn GitObjectEngine, body: &[u8]) -> Result<Vec<u8>> {
    let request = WantHave::parse(body);
    if request.wants.is_empty() {
        return Ok(FLUSH_PKT.to_vec());
    }

    let haves: HashSet<ObjectId> = request.haves.iter().copied().collect();
    let objects: Vec<ObjectId> = collect_reachable(engine, &request.wants)
        .await
        .into_iter()
        .filter(|id| !haves.contains(id))
        .collect();

    let mut writer = PktLineWriter::new(Vec::new());
    writer.write_line("NAK")?;
    if objects.is_empty() {
        writer.flush_pkt()?;
        return Ok(writer.into_inner());
    }

    let pack = engine.build_pack(&objects).await?;
    debug!(
        wants = request.wants.len(),
        haves = request.haves.len(),
        objects = objects.len(),
        bytes = pack.len(),
        "sending pack"
    );
    writer.write_raw(&pack)?;
    Ok(writer.into_inner())
}

/// Answers an upload-pack request body.
///
/// Never fails: any error degrades to a bare flush packet.
pub async fn upload_pack(engine: &dyn GitObjectEngine, body: &[u8]) -> Vec<u8> {
    match respond(engine, body).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "upload-pack failed");
            FLUSH_PKT.to_vec()
        }
    }
}
