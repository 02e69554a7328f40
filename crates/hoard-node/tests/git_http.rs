//! End-to-end tests for the git smart HTTP endpoints.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use bytes::Bytes;
use hoard_auth::{hash_password, Account, BasicCredentials, CredentialVerifier, MemoryCredentialStore};
use hoard_git::{
    decode_lines, encode_pkt_line, parse_pack, GitObject, ObjectId, PackBuilder, ProtocolSettings,
    TreeEntry, FLUSH_PKT, MODE_FILE,
};
use hoard_node::api::{create_router, AppState};
use hoard_node::repos::{RepositoryRecord, StaticRepositories};
use hoard_storage::{ListPage, MemoryStore, ObjectStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tower::ServiceExt;

const SIG: &str = "A U Thor <author@example.com> 1700000000 +0000";
const PASSWORD: &str = "open sesame";

fn password_hash() -> String {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(PASSWORD).unwrap()).clone()
}

fn repositories() -> StaticRepositories {
    StaticRepositories::new([
        RepositoryRecord {
            owner_id: "100".into(),
            owner: "alice".into(),
            name: "public".into(),
            private: false,
        },
        RepositoryRecord {
            owner_id: "100".into(),
            owner: "alice".into(),
            name: "secret".into(),
            private: true,
        },
    ])
}

fn verifier() -> CredentialVerifier {
    CredentialVerifier::new(Arc::new(MemoryCredentialStore::with_accounts([
        Account {
            id: "100".into(),
            username: "alice".into(),
            password_hash: Some(password_hash()),
        },
        Account {
            id: "200".into(),
            username: "bob".into(),
            password_hash: Some(password_hash()),
        },
    ])))
}

fn create_test_app(store: Arc<dyn ObjectStore>) -> Router {
    create_router(AppState {
        store,
        repos: Arc::new(repositories()),
        verifier: verifier(),
        settings: ProtocolSettings {
            default_branch: "main".into(),
            agent: "hoard/test".into(),
        },
        realm: "hoard-test".into(),
        max_body_bytes: 1024 * 1024,
    })
}

fn auth(user: &str, password: &str) -> String {
    BasicCredentials {
        identifier: user.into(),
        secret: password.into(),
    }
    .to_header()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

fn get(uri: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, authorization: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

fn lines(body: &[u8]) -> Vec<String> {
    decode_lines(body)
        .into_iter()
        .map(|l| String::from_utf8_lossy(&l).into_owned())
        .collect()
}

struct Commit {
    blob: GitObject,
    tree: GitObject,
    commit: GitObject,
}

fn commit() -> Commit {
    let blob = GitObject::blob("hello\n");
    let tree = GitObject::tree(&[TreeEntry::new(MODE_FILE, "hello.txt", blob.id)]);
    let commit = GitObject::commit(&tree.id, &[], SIG, SIG, "initial\n");
    Commit { blob, tree, commit }
}

fn push_body(commands: &[(ObjectId, ObjectId, &str)], objects: &[&GitObject]) -> Vec<u8> {
    let mut body = Vec::new();
    for (i, (old, new, name)) in commands.iter().enumerate() {
        let line = if i == 0 {
            format!("{} {} {}\0report-status delete-refs\n", old, new, name)
        } else {
            format!("{} {} {}\n", old, new, name)
        };
        body.extend(encode_pkt_line(line.as_bytes()));
    }
    body.extend_from_slice(FLUSH_PKT);

    let mut pack = PackBuilder::new();
    for object in objects {
        pack.add((*object).clone());
    }
    body.extend(pack.build().unwrap());
    body
}

// ==================== Routing ====================

#[tokio::test]
async fn test_health() {
    let app = create_test_app(Arc::new(MemoryStore::new()));
    let response = send(&app, get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_unknown_paths_and_services_are_404() {
    let app = create_test_app(Arc::new(MemoryStore::new()));

    let cases = [
        "/alice/missing/info/refs?service=git-upload-pack",
        "/bob/public/info/refs?service=git-upload-pack",
        "/alice/public/info/refs?service=git-upload-archive",
        "/alice/public/info/refs",
        "/alice/public/objects/info/packs",
    ];
    for uri in cases {
        let response = send(&app, get(uri, None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
    }
}

#[tokio::test]
async fn test_empty_repository_advertisement() {
    let app = create_test_app(Arc::new(MemoryStore::new()));
    let response = send(
        &app,
        get("/alice/public.git/info/refs?service=git-upload-pack", None),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/x-git-upload-pack-advertisement"
    );
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");

    let body = body_bytes(response).await;
    assert!(body.starts_with(b"001e# service=git-upload-pack\n0000"));
    let lines = lines(&body);
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with(&format!("{} capabilities^{{}}\0", ObjectId::ZERO)));
    assert!(body.ends_with(b"0000"));
}

// ==================== Authentication ====================

#[tokio::test]
async fn test_receive_pack_requires_owner_credentials() {
    let app = create_test_app(Arc::new(MemoryStore::new()));
    let uri = "/alice/public/info/refs?service=git-receive-pack";

    let cases = [
        None,
        Some(auth("alice", "wrong")),
        Some(auth("bob", PASSWORD)),
        Some(auth("nobody", PASSWORD)),
        Some("Bearer token".to_string()),
    ];
    for authorization in &cases {
        let response = send(&app, get(uri, authorization.as_deref())).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            "Basic realm=\"hoard-test\""
        );
    }

    let response = send(&app, get(uri, Some(&auth("alice", PASSWORD)))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/x-git-receive-pack-advertisement"
    );
}

#[tokio::test]
async fn test_private_repository_requires_owner_for_fetch() {
    let app = create_test_app(Arc::new(MemoryStore::new()));
    let uri = "/alice/secret/info/refs?service=git-upload-pack";

    assert_eq!(
        send(&app, get(uri, None)).await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        send(&app, get(uri, Some(&auth("bob", PASSWORD)))).await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        send(&app, post("/alice/secret/git-upload-pack", None, b"0000".to_vec()))
            .await
            .status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        send(&app, get(uri, Some(&auth("alice", PASSWORD)))).await.status(),
        StatusCode::OK
    );
}

/// Counts every call that reaches the object store.
#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    calls: AtomicUsize,
}

#[async_trait]
impl ObjectStore for CountingStore {
    async fn get(&self, key: &str) -> hoard_storage::Result<Option<Bytes>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> hoard_storage::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, data).await
    }

    async fn delete(&self, key: &str) -> hoard_storage::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    async fn list_page(&self, prefix: &str, cursor: Option<String>) -> hoard_storage::Result<ListPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_page(prefix, cursor).await
    }
}

#[tokio::test]
async fn test_rejected_requests_never_touch_the_store() {
    let store = Arc::new(CountingStore::default());
    let app = create_test_app(store.clone());
    let c = commit();
    let body = push_body(
        &[(ObjectId::ZERO, c.commit.id, "refs/heads/main")],
        &[&c.blob, &c.tree, &c.commit],
    );

    let response = send(&app, post("/alice/public/git-receive-pack", None, body.clone())).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = send(
        &app,
        post("/alice/public/git-receive-pack", Some(&auth("bob", PASSWORD)), body),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = send(
        &app,
        get("/alice/secret/info/refs?service=git-upload-pack", None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    assert!(store.inner.is_empty());
}

// ==================== Push and fetch ====================

#[tokio::test]
async fn test_push_then_clone() {
    let store = Arc::new(MemoryStore::new());
    let app = create_test_app(store.clone());
    let alice = auth("alice", PASSWORD);
    let c = commit();

    // Push a first commit to main.
    let body = push_body(
        &[(ObjectId::ZERO, c.commit.id, "refs/heads/main")],
        &[&c.blob, &c.tree, &c.commit],
    );
    let response = send(&app, post("/alice/public.git/git-receive-pack", Some(&alice), body)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/x-git-receive-pack-result"
    );
    let report = body_bytes(response).await;
    assert_eq!(lines(&report), vec!["unpack ok", "ok refs/heads/main"]);
    assert!(report.ends_with(b"0000"));

    let ref_key = "repos/100/public.git/refs/heads/main";
    assert_eq!(
        store.get(ref_key).await.unwrap().unwrap(),
        format!("{}\n", c.commit.id)
    );
    assert_eq!(
        store.get("repos/100/public.git/HEAD").await.unwrap().unwrap(),
        "ref: refs/heads/main\n"
    );

    // The advertisement now shows HEAD and main.
    let response = send(
        &app,
        get("/alice/public/info/refs?service=git-upload-pack", None),
    )
    .await;
    let advertised = lines(&body_bytes(response).await);
    assert_eq!(advertised.len(), 3);
    assert!(advertised[1].starts_with(&format!("{} HEAD\0", c.commit.id)));
    assert!(advertised[1].contains("symref=HEAD:refs/heads/main"));
    assert_eq!(advertised[2], format!("{} refs/heads/main", c.commit.id));

    // Clone it back.
    let mut request = Vec::new();
    request.extend(encode_pkt_line(
        format!("want {} ofs-delta no-progress\n", c.commit.id).as_bytes(),
    ));
    request.extend_from_slice(FLUSH_PKT);
    request.extend(encode_pkt_line(b"done\n"));
    let response = send(&app, post("/alice/public/git-upload-pack", None, request)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/x-git-upload-pack-result"
    );

    let body = body_bytes(response).await;
    assert!(body.starts_with(b"0008NAK\n"));
    let objects = parse_pack(&body[8..]).unwrap();
    let ids: Vec<ObjectId> = objects.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![c.commit.id, c.tree.id, c.blob.id]);
}

#[tokio::test]
async fn test_gzipped_upload_pack_request() {
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    let app = create_test_app(Arc::new(MemoryStore::new()));
    let c = commit();
    let body = push_body(
        &[(ObjectId::ZERO, c.commit.id, "refs/heads/main")],
        &[&c.blob, &c.tree, &c.commit],
    );
    let response = send(
        &app,
        post("/alice/public/git-receive-pack", Some(&auth("alice", PASSWORD)), body),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Large enough that git would compress it: one want and many unknown haves.
    let mut request = encode_pkt_line(
        format!("want {} ofs-delta no-progress\n", c.commit.id).as_bytes(),
    );
    request.extend_from_slice(FLUSH_PKT);
    for i in 0..30u8 {
        request.extend(encode_pkt_line(
            format!("have {}\n", ObjectId::from_bytes([i + 1; 20])).as_bytes(),
        ));
    }
    request.extend(encode_pkt_line(b"done\n"));
    assert!(request.len() > 1024);

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&request).unwrap();
    let gzipped = encoder.finish().unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/alice/public/git-upload-pack")
        .header(header::CONTENT_ENCODING, "gzip")
        .header(header::CONTENT_TYPE, "application/x-git-upload-pack-request")
        .body(Body::from(gzipped))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_bytes(response).await;
    assert!(body.starts_with(b"0008NAK\n"));
    let objects = parse_pack(&body[8..]).unwrap();
    let ids: Vec<ObjectId> = objects.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![c.commit.id, c.tree.id, c.blob.id]);
}

#[tokio::test]
async fn test_upload_pack_without_wants_is_flush() {
    let app = create_test_app(Arc::new(MemoryStore::new()));
    let response = send(&app, post("/alice/public/git-upload-pack", None, b"0000".to_vec())).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&body_bytes(response).await[..], b"0000");
}

#[tokio::test]
async fn test_push_without_pack_changes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let app = create_test_app(store.clone());
    let c = commit();

    let mut body = encode_pkt_line(
        format!("{} {} refs/heads/main\0report-status\n", ObjectId::ZERO, c.commit.id).as_bytes(),
    );
    body.extend_from_slice(FLUSH_PKT);
    let response = send(
        &app,
        post("/alice/public/git-receive-pack", Some(&auth("alice", PASSWORD)), body),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&body_bytes(response).await[..], b"000eunpack ok\n0000");
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_delete_and_bad_ref_in_one_push() {
    let store = Arc::new(MemoryStore::new());
    let app = create_test_app(store.clone());
    let alice = auth("alice", PASSWORD);
    let c = commit();

    let body = push_body(
        &[
            (ObjectId::ZERO, c.commit.id, "refs/heads/main"),
            (ObjectId::ZERO, c.commit.id, "refs/heads/topic"),
        ],
        &[&c.blob, &c.tree, &c.commit],
    );
    send(&app, post("/alice/public/git-receive-pack", Some(&alice), body)).await;
    assert!(store
        .get("repos/100/public.git/refs/heads/topic")
        .await
        .unwrap()
        .is_some());

    let body = push_body(
        &[
            (c.commit.id, ObjectId::ZERO, "refs/heads/topic"),
            (ObjectId::ZERO, c.commit.id, "refs/heads/bad..name"),
        ],
        &[],
    );
    let response = send(&app, post("/alice/public/git-receive-pack", Some(&alice), body)).await;
    let report = lines(&body_bytes(response).await);
    assert_eq!(
        report,
        vec![
            "unpack ok",
            "ok refs/heads/topic",
            "ng refs/heads/bad..name funny refname"
        ]
    );
    assert!(store
        .get("repos/100/public.git/refs/heads/topic")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_corrupt_pack_reports_unpack_error() {
    let store = Arc::new(MemoryStore::new());
    let app = create_test_app(store.clone());
    let c = commit();

    let mut body = push_body(
        &[(ObjectId::ZERO, c.commit.id, "refs/heads/main")],
        &[&c.blob],
    );
    let last = body.len() - 1;
    body[last] ^= 0xff;

    let response = send(
        &app,
        post("/alice/public/git-receive-pack", Some(&auth("alice", PASSWORD)), body),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = lines(&body_bytes(response).await);
    assert_eq!(report.len(), 1);
    assert!(report[0].starts_with("ng unpack error"));
    assert!(store
        .get("repos/100/public.git/refs/heads/main")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let app = create_test_app(Arc::new(MemoryStore::new()));
    let body = vec![b'0'; 2 * 1024 * 1024];
    let response = send(&app, post("/alice/public/git-upload-pack", None, body)).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_gzip_body_is_limited_after_inflation() {
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    let app = create_test_app(Arc::new(MemoryStore::new()));
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&vec![b'0'; 2 * 1024 * 1024]).unwrap();
    let gzipped = encoder.finish().unwrap();
    assert!(gzipped.len() < 1024 * 1024);

    let request = Request::builder()
        .method("POST")
        .uri("/alice/public/git-upload-pack")
        .header(header::CONTENT_ENCODING, "gzip")
        .body(Body::from(gzipped))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
