//! Ref advertisement for `GET /info/refs`.
//!
//! See: https://git-scm.com/docs/http-protocol#_smart_clients

use crate::engine::GitObjectEngine;
use crate::object::ObjectId;
use crate::pktline::PktLineWriter;
use crate::Result;
use std::fmt;
use tracing::debug;

/// The two smart-HTTP services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Fetch and clone.
    UploadPack,
    /// Push.
    ReceivePack,
}

impl Service {
    /// Parses the `service` query value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "git-upload-pack" => Some(Self::UploadPack),
            "git-receive-pack" => Some(Self::ReceivePack),
            _ => None,
        }
    }

    /// Wire name of the service.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
        }
    }

    /// Content type of the `info/refs` response.
    pub fn advertisement_content_type(&self) -> &'static str {
        match self {
            Self::UploadPack => "application/x-git-upload-pack-advertisement",
            Self::ReceivePack => "application/x-git-receive-pack-advertisement",
        }
    }

    /// Content type of the POST response.
    pub fn result_content_type(&self) -> &'static str {
        match self {
            Self::UploadPack => "application/x-git-upload-pack-result",
            Self::ReceivePack => "application/x-git-receive-pack-result",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-wide protocol settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolSettings {
    /// Branch advertised (and created for `HEAD`) when `HEAD` says nothing.
    pub default_branch: String,
    /// Value of the `agent=` capability.
    pub agent: String,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            default_branch: "main".to_string(),
            agent: format!("hoard/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Capability string for `service`.
///
/// `head_branch` is the short branch name `HEAD` points at.
pub fn capabilities(service: Service, head_branch: &str, agent: &str) -> String {
    match service {
        Service::UploadPack => format!(
            "ofs-delta no-progress symref=HEAD:refs/heads/{} agent={}",
            head_branch, agent
        ),
        Service::ReceivePack => format!("report-status delete-refs ofs-delta agent={}", agent),
    }
}

/// The `# service=<name>` preamble followed by a flush.
pub fn service_header(service: Service) -> Result<Vec<u8>> {
    let mut writer = PktLineWriter::new(Vec::new());
    writer.write_line(&format!("# service={}", service))?;
    writer.flush_pkt()?;
    Ok(writer.into_inner())
}

/// Builds the ref advertisement (without the service preamble).
pub async fn advertise_refs(
    engine: &dyn GitObjectEngine,
    service: Service,
    settings: &ProtocolSettings,
) -> Result<Vec<u8>> {
    let mut refs: Vec<(String, ObjectId)> = Vec::new();
    let mut names = engine.list_branches().await?;
    names.extend(engine.list_tags().await?);
    for name in names {
        if let Some(id) = engine.resolve_ref(&name).await? {
            refs.push((name, id));
        }
    }

    let head = engine.resolve_ref("HEAD").await.ok().flatten();
    let head_branch = engine
        .head_target()
        .await
        .ok()
        .flatten()
        .and_then(|t| t.strip_prefix("refs/heads/").map(str::to_string))
        .unwrap_or_else(|| settings.default_branch.clone());
    let caps = capabilities(service, &head_branch, &settings.agent);

    let mut writer = PktLineWriter::new(Vec::new());
    let first = match (head, refs.first()) {
        (Some(id), _) => Some(format!("{} HEAD", id)),
        (None, Some((name, id))) => Some(format!("{} {}", id, name)),
        (None, None) => None,
    };

    match first {
        None => {
            writer.write_line(&format!("{} capabilities^{{}}\0{}", ObjectId::ZERO, caps))?;
        }
        Some(first) => {
            writer.write_line(&format!("{}\0{}", first, caps))?;
            for (name, id) in &refs {
                let line = format!("{} {}", id, name);
                if line != first {
                    writer.write_line(&line)?;
                }
            }
        }
    }
    writer.flush_pkt()?;

    debug!(service = %service, refs = refs.len(), "built ref advertisement");
    Ok(writer.into_inner())
}

/// Full `info/refs` body: service preamble plus advertisement.
pub async fn info_refs(
    engine: &dyn GitObjectEngine,
    service: Service,
    settings: &ProtocolSettings,
) -> Result<Vec<u8>> {
    let mut body = service_header(service)?;
    body.extend(advertise_refs(engine, service, settings).await?);
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FsObjectEngine;
    use crate::pktline::decode_lines;
    use hoard_storage::{MemoryStore, ObjectStoreFs, RepoPrefix};
    use std::sync::Arc;

    fn engine() -> FsObjectEngine {
        let prefix = RepoPrefix::new("1", "demo").unwrap();
        FsObjectEngine::new(Arc::new(ObjectStoreFs::new(
            Arc::new(MemoryStore::new()),
            prefix,
        )))
    }

    fn settings() -> ProtocolSettings {
        ProtocolSettings {
            default_branch: "main".into(),
            agent: "hoard/test".into(),
        }
    }

    fn lines(buf: &[u8]) -> Vec<String> {
        decode_lines(buf)
            .into_iter()
            .map(|l| String::from_utf8(l).unwrap())
            .collect()
    }

    #[test]
    fn test_service_names() {
        assert_eq!(Service::parse("git-upload-pack"), Some(Service::UploadPack));
        assert_eq!(Service::parse("git-receive-pack"), Some(Service::ReceivePack));
        assert_eq!(Service::parse("git-upload-archive"), None);
        assert_eq!(
            Service::ReceivePack.result_content_type(),
            "application/x-git-receive-pack-result"
        );
    }

    #[test]
    fn test_capabilities() {
        assert_eq!(
            capabilities(Service::UploadPack, "trunk", "a/1"),
            "ofs-delta no-progress symref=HEAD:refs/heads/trunk agent=a/1"
        );
        assert_eq!(
            capabilities(Service::ReceivePack, "trunk", "a/1"),
            "report-status delete-refs ofs-delta agent=a/1"
        );
    }

    #[tokio::test]
    async fn test_empty_repository() {
        let engine = engine();
        let body = advertise_refs(&engine, Service::UploadPack, &settings())
            .await
            .unwrap();

        let expected = format!(
            "{} capabilities^{{}}\0ofs-delta no-progress symref=HEAD:refs/heads/main agent=hoard/test",
            "0".repeat(40)
        );
        assert_eq!(lines(&body), vec![expected]);
        assert!(body.ends_with(b"0000"));
    }

    #[tokio::test]
    async fn test_head_and_two_branches() {
        let engine = engine();
        let main = ObjectId::from_bytes([1; 20]);
        let feature = ObjectId::from_bytes([2; 20]);
        engine.write_ref("refs/heads/main", &main).await.unwrap();
        engine.write_ref("refs/heads/feature", &feature).await.unwrap();
        engine
            .write_symbolic_ref("HEAD", "refs/heads/main")
            .await
            .unwrap();

        let body = advertise_refs(&engine, Service::UploadPack, &settings())
            .await
            .unwrap();
        let lines = lines(&body);

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(&format!("{} HEAD\0", main)));
        assert!(lines[0].contains("symref=HEAD:refs/heads/main"));
        assert_eq!(lines[1], format!("{} refs/heads/feature", feature));
        assert_eq!(lines[2], format!("{} refs/heads/main", main));
    }

    #[tokio::test]
    async fn test_symref_follows_head_target() {
        let engine = engine();
        let id = ObjectId::from_bytes([3; 20]);
        engine.write_ref("refs/heads/trunk", &id).await.unwrap();
        engine
            .write_symbolic_ref("HEAD", "refs/heads/trunk")
            .await
            .unwrap();

        let body = advertise_refs(&engine, Service::UploadPack, &settings())
            .await
            .unwrap();
        assert!(lines(&body)[0].contains("symref=HEAD:refs/heads/trunk"));
    }

    #[tokio::test]
    async fn test_unresolved_head_uses_first_ref() {
        let engine = engine();
        let id = ObjectId::from_bytes([4; 20]);
        engine.write_ref("refs/tags/v1", &id).await.unwrap();

        let body = advertise_refs(&engine, Service::ReceivePack, &settings())
            .await
            .unwrap();
        let lines = lines(&body);
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0],
            format!(
                "{} refs/tags/v1\0report-status delete-refs ofs-delta agent=hoard/test",
                id
            )
        );
    }

    #[tokio::test]
    async fn test_info_refs_preamble() {
        let engine = engine();
        let body = info_refs(&engine, Service::ReceivePack, &settings())
            .await
            .unwrap();
        assert!(body.starts_with(b"001f# service=git-receive-pack\n0000"));
    }
}
