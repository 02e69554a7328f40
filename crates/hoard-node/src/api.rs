//! HTTP API for the Hoard node.
//!
//! Implements the git smart HTTP endpoints for fetch, clone and push. Every
//! request builds its own [`ObjectStoreFs`] over the shared store, so
//! filesystem caches never outlive a request.

use crate::config::NodeConfig;
use crate::repos::{RepositoryLookup, RepositoryRecord, StaticRepositories};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hoard_auth::{Account, CredentialVerifier, Identity, MemoryCredentialStore};
use hoard_git::{info_refs, receive_pack, upload_pack, FsObjectEngine, ProtocolSettings, Service};
use hoard_storage::{ObjectStore, ObjectStoreFs, RepoPrefix};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    decompression::RequestDecompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
};
use tracing::{debug, info, instrument};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Durable object store holding every repository.
    pub store: Arc<dyn ObjectStore>,
    /// Repository metadata.
    pub repos: Arc<dyn RepositoryLookup>,
    /// Basic-auth verifier.
    pub verifier: CredentialVerifier,
    /// Git protocol settings.
    pub settings: ProtocolSettings,
    /// Realm for `WWW-Authenticate` challenges.
    pub realm: String,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl AppState {
    /// Builds state from configuration, opening the configured store.
    pub async fn from_config(config: &NodeConfig) -> hoard_storage::Result<Self> {
        let store = config.storage.open().await?;
        let accounts = config.accounts.iter().cloned().map(Account::from);
        Ok(Self {
            store,
            repos: Arc::new(StaticRepositories::new(config.repositories.clone())),
            verifier: CredentialVerifier::new(Arc::new(MemoryCredentialStore::with_accounts(
                accounts,
            ))),
            settings: config.git.protocol_settings(),
            realm: config.server.realm.clone(),
            max_body_bytes: config.server.max_body_bytes,
        })
    }
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("authentication required")]
    Unauthorized { realm: String },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("git error: {0}")]
    Git(#[from] hoard_git::GitError),
    #[error("storage error: {0}")]
    Storage(#[from] hoard_storage::StorageError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Git(_) | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response();

        if let ApiError::Unauthorized { realm } = &self {
            let challenge = format!("Basic realm=\"{}\"", realm.replace('"', ""));
            if let Ok(value) = HeaderValue::from_str(&challenge) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, value);
            }
        }
        response
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Query string of `GET /info/refs`.
#[derive(Debug, Deserialize)]
pub struct InfoRefsQuery {
    /// Requested service.
    pub service: Option<String>,
}

/// Creates the API router.
///
/// Git clients gzip large upload-pack requests; bodies are inflated before
/// the size limit is applied.
pub fn create_router(state: AppState) -> Router {
    let max_body_bytes = state.max_body_bytes;
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Git smart HTTP protocol
        .route("/{owner}/{repo}/info/refs", get(git_info_refs))
        .route("/{owner}/{repo}/git-upload-pack", post(git_upload_pack))
        .route("/{owner}/{repo}/git-receive-pack", post(git_receive_pack))
        .fallback(not_found)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(RequestDecompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn not_found() -> ApiError {
    ApiError::NotFound("no such route".into())
}

/// Strips one trailing `.git` from a repository path segment.
pub fn repository_name(segment: &str) -> &str {
    segment.strip_suffix(".git").unwrap_or(segment)
}

/// Looks up the repository and enforces access rules.
///
/// Receive-pack always needs the owner's credentials; upload-pack needs them
/// only for private repositories. Runs before anything touches the store.
async fn authorize(
    state: &AppState,
    owner: &str,
    repo: &str,
    service: Service,
    headers: &HeaderMap,
) -> Result<(RepositoryRecord, Option<Identity>), ApiError> {
    let name = repository_name(repo);
    let record = state
        .repos
        .find(owner, name)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("{}/{}", owner, name)))?;

    let needs_auth = record.private || service == Service::ReceivePack;
    if !needs_auth {
        return Ok((record, None));
    }

    let unauthorized = || ApiError::Unauthorized {
        realm: state.realm.clone(),
    };
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let identity = state
        .verifier
        .verify(authorization)
        .await
        .ok_or_else(unauthorized)?;
    if identity.id != record.owner_id {
        debug!(user = %identity.username, owner = %record.owner, "caller does not own repository");
        return Err(unauthorized());
    }
    Ok((record, Some(identity)))
}

fn open_repository(
    state: &AppState,
    record: &RepositoryRecord,
) -> Result<(Arc<ObjectStoreFs>, FsObjectEngine), ApiError> {
    let prefix = RepoPrefix::new(&record.owner_id, &record.name)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let fs = Arc::new(ObjectStoreFs::new(state.store.clone(), prefix));
    let engine = FsObjectEngine::new(fs.clone());
    Ok((fs, engine))
}

fn git_response(content_type: &'static str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

/// Git info/refs endpoint - advertises references.
#[instrument(skip_all, fields(owner = %owner, repo = %repo, service))]
async fn git_info_refs(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    Query(query): Query<InfoRefsQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let service = query
        .service
        .as_deref()
        .and_then(Service::parse)
        .ok_or_else(|| ApiError::NotFound("unsupported service".into()))?;
    tracing::Span::current().record("service", service.as_str());

    let (record, _) = authorize(&state, &owner, &repo, service, &headers).await?;
    let (_, engine) = open_repository(&state, &record)?;

    let body = info_refs(&engine, service, &state.settings).await?;
    Ok(git_response(service.advertisement_content_type(), body))
}

/// Git upload-pack endpoint - handles fetch/clone.
#[instrument(skip_all, fields(owner = %owner, repo = %repo, bytes = body.len()))]
async fn git_upload_pack(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let service = Service::UploadPack;
    let (record, _) = authorize(&state, &owner, &repo, service, &headers).await?;
    let (_, engine) = open_repository(&state, &record)?;

    let output = upload_pack(&engine, &body).await;
    Ok(git_response(service.result_content_type(), output))
}

/// Git receive-pack endpoint - handles push.
#[instrument(skip_all, fields(owner = %owner, repo = %repo, bytes = body.len()))]
async fn git_receive_pack(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let service = Service::ReceivePack;
    let (record, identity) = authorize(&state, &owner, &repo, service, &headers).await?;
    let (fs, engine) = open_repository(&state, &record)?;

    let report = receive_pack(fs.as_ref(), &engine, &body, &state.settings).await;
    info!(
        owner = %record.owner,
        name = %record.name,
        user = identity.as_ref().map(|i| i.username.as_str()).unwrap_or_default(),
        refs = report.refs.len(),
        success = report.is_success(),
        "Push completed"
    );

    Ok(git_response(service.result_content_type(), report.encode()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_name() {
        assert_eq!(repository_name("demo.git"), "demo");
        assert_eq!(repository_name("demo"), "demo");
        assert_eq!(repository_name("demo.git.git"), "demo.git");
    }

    #[test]
    fn test_unauthorized_carries_challenge() {
        let response = ApiError::Unauthorized {
            realm: "hoard".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            "Basic realm=\"hoard\""
        );
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            ApiError::NotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::BadRequest("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
