//! HTTP API for the directory node
//!
//! Every remote operation maps to one route. Internally each component
//! returns a `Result` that tells validation failures, missing rows and
//! store failures apart; this layer folds them all into the legacy reply
//! (`false`, `null`, `[]` or `""`) that existing clients and storage
//! servers expect.
//!
//! Server unregistration is the exception. Its failure is returned as an
//! HTTP 500 with an error body.

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::common::{
    AuditEventType, AuditLogger, CascadeReport, DirectoryStore, ErrorKind, MetricsRegistry,
    NewFileRecord, Result, ServerId, UserId,
};
use crate::coordinator::accounts::{AccountStore, Credentials};
use crate::coordinator::catalog::{FileCatalog, FileListing};
use crate::coordinator::placement::{PlacementCoordinator, ReplicaHash};
use crate::coordinator::registry::ServerRegistry;

// === Wire types ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressResponse {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressesResponse {
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterServerRequest {
    pub server_id: ServerId,
    pub address: String,
}

/// Hash and salt are base64 encoded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub username: String,
    pub password_hash: String,
    pub salt: String,
}

/// Usernames travel in the query string so that any name, including
/// `""` and `..`, reaches the handler unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsernameQuery {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsResponse {
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordFilesRequest {
    pub files: Vec<NewFileRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListFilesRequest {
    pub prefixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListFilesResponse {
    pub files: Vec<FileListing>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupQuery {
    pub server_id: ServerId,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathQuery {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashesResponse {
    pub hashes: Vec<ReplicaHash>,
}

// === State ===

/// Shared directory state for HTTP handlers.
#[derive(Clone)]
pub struct DirState {
    pub store: Arc<dyn DirectoryStore>,
    pub accounts: Arc<AccountStore>,
    pub registry: Arc<ServerRegistry>,
    pub catalog: Arc<FileCatalog>,
    pub placement: Arc<PlacementCoordinator>,
    pub metrics: Arc<MetricsRegistry>,
    pub audit: Arc<AuditLogger>,
}

impl DirState {
    pub fn new(store: Arc<dyn DirectoryStore>, audit: AuditLogger) -> Self {
        Self {
            accounts: Arc::new(AccountStore::new(store.clone())),
            registry: Arc::new(ServerRegistry::new(store.clone())),
            catalog: Arc::new(FileCatalog::new(store.clone())),
            placement: Arc::new(PlacementCoordinator::new(store.clone())),
            metrics: Arc::new(MetricsRegistry::new()),
            audit: Arc::new(audit),
            store,
        }
    }

    /// Record the call and fold a failure into `None`.
    fn settle<T>(&self, op: &'static str, started: Instant, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => {
                self.metrics.record(op, started, true);
                Some(value)
            }
            Err(e) => {
                self.metrics.record(op, started, false);
                match e.kind() {
                    ErrorKind::Backend => tracing::warn!("{} failed: {}", op, e),
                    _ => tracing::debug!("{} rejected: {}", op, e),
                }
                None
            }
        }
    }
}

/// Creates the HTTP router with all endpoints.
pub fn create_router(state: DirState, max_body_bytes: usize) -> Router {
    Router::new()
        // Placement and server membership
        .route("/servers", post(register_server))
        .route("/servers/next", get(next_server))
        .route("/servers/:server_id", delete(unregister_server))
        // Accounts
        .route("/accounts", post(create_account).get(lookup_credentials))
        // Files and replicas
        .route("/files", post(record_files))
        .route("/users/:user_id/servers", get(active_servers))
        .route("/users/:user_id/listing", post(list_files))
        .route("/users/:user_id/backups", get(backup_servers))
        .route("/users/:user_id/files", delete(remove_file))
        .route("/users/:user_id/hashes", get(file_hashes))
        // Health and observability
        .route("/health", get(health))
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .route("/admin/status", get(admin_status))
        .route("/metrics", get(metrics))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Server registry ===

async fn next_server(State(state): State<DirState>) -> Json<AddressResponse> {
    let started = Instant::now();
    let address = state
        .settle("next_server", started, state.registry.next_server())
        .flatten()
        .unwrap_or_default();
    Json(AddressResponse { address })
}

async fn register_server(
    State(state): State<DirState>,
    Json(req): Json<RegisterServerRequest>,
) -> Json<OkResponse> {
    let started = Instant::now();
    let result = state.registry.register_server(req.server_id, &req.address);
    let ok = state.settle("register_server", started, result).is_some();
    if ok {
        state.audit.log(
            AuditEventType::ServerRegistered,
            format!("server:{}", req.server_id),
            format!("registered at {}", req.address),
        );
    }
    Json(OkResponse { ok })
}

async fn unregister_server(
    State(state): State<DirState>,
    Path(server_id): Path<ServerId>,
) -> std::result::Result<Json<CascadeReport>, (StatusCode, Json<ErrorResponse>)> {
    let started = Instant::now();
    match state.registry.unregister_server(server_id) {
        Ok(report) => {
            state.metrics.record("unregister_server", started, true);
            if report.server_existed {
                state.audit.log(
                    AuditEventType::ServerUnregistered,
                    format!("server:{}", server_id),
                    format!("{} file rows dropped", report.files_removed),
                );
            }
            Ok(Json(report))
        }
        Err(e) => {
            state.metrics.record("unregister_server", started, false);
            tracing::error!("Unregister of server {} failed: {}", server_id, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

// === Accounts ===

async fn create_account(
    State(state): State<DirState>,
    Json(req): Json<CreateAccountRequest>,
) -> Json<OkResponse> {
    let started = Instant::now();
    let result = state
        .accounts
        .create_account(&req.username, &req.password_hash, &req.salt);
    let created = state.settle("create_account", started, result);
    if let Some(id) = created {
        state.audit.log(
            AuditEventType::AccountCreated,
            format!("user:{}", id),
            format!("account {} created", req.username),
        );
    }
    Json(OkResponse {
        ok: created.is_some(),
    })
}

async fn lookup_credentials(
    State(state): State<DirState>,
    Query(query): Query<UsernameQuery>,
) -> Json<CredentialsResponse> {
    let started = Instant::now();
    // An unknown username is an answer, not a failure
    let result = match state.accounts.lookup_credentials(&query.username) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        other => other.map(Some),
    };
    let credentials = state
        .settle("lookup_credentials", started, result)
        .flatten();
    Json(CredentialsResponse { credentials })
}

// === Files and replicas ===

async fn record_files(
    State(state): State<DirState>,
    Json(req): Json<RecordFilesRequest>,
) -> Json<OkResponse> {
    let started = Instant::now();
    let ok = state
        .settle("record_files", started, state.catalog.record_files(&req.files))
        .is_some();
    Json(OkResponse { ok })
}

async fn active_servers(
    State(state): State<DirState>,
    Path(user_id): Path<UserId>,
) -> Json<AddressesResponse> {
    let started = Instant::now();
    let addresses = state
        .settle(
            "active_servers_for",
            started,
            state.placement.active_servers_for(user_id),
        )
        .unwrap_or_default();
    Json(AddressesResponse { addresses })
}

async fn list_files(
    State(state): State<DirState>,
    Path(user_id): Path<UserId>,
    Json(req): Json<ListFilesRequest>,
) -> Json<ListFilesResponse> {
    let started = Instant::now();
    let files = state
        .settle(
            "list_files",
            started,
            state.catalog.list_files(user_id, &req.prefixes),
        )
        .unwrap_or_default();
    Json(ListFilesResponse { files })
}

async fn backup_servers(
    State(state): State<DirState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<BackupQuery>,
) -> Json<AddressesResponse> {
    let started = Instant::now();
    let addresses = state
        .settle(
            "backup_servers_for",
            started,
            state
                .placement
                .backup_servers_for(query.server_id, user_id, &query.path),
        )
        .unwrap_or_default();
    Json(AddressesResponse { addresses })
}

async fn remove_file(
    State(state): State<DirState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<PathQuery>,
) -> Json<OkResponse> {
    let started = Instant::now();
    let removed = state.settle(
        "remove_file",
        started,
        state.catalog.remove_file(user_id, &query.path),
    );
    if let Some(n) = removed.filter(|n| *n > 0) {
        state.audit.log(
            AuditEventType::FilesRemoved,
            format!("user:{}", user_id),
            format!("{} ({} replicas)", query.path, n),
        );
    }
    Json(OkResponse {
        ok: removed.is_some(),
    })
}

async fn file_hashes(
    State(state): State<DirState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<PathQuery>,
) -> Json<HashesResponse> {
    let started = Instant::now();
    let hashes = state
        .settle(
            "hashes_for",
            started,
            state.placement.hashes_for(user_id, &query.path),
        )
        .unwrap_or_default();
    Json(HashesResponse { hashes })
}

// === Health and observability ===

async fn health(State(state): State<DirState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "backend": state.store.name(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Liveness probe: answers as long as the process serves requests
async fn health_live() -> impl IntoResponse {
    Json(json!({
        "alive": true,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": crate::common::timestamp_now(),
    }))
}

/// Readiness probe: the store must answer
async fn health_ready(State(state): State<DirState>) -> impl IntoResponse {
    match state.store.ping() {
        Ok(()) => (StatusCode::OK, Json(json!({ "ready": true }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "ready": false, "reason": e.to_string() })),
        ),
    }
}

async fn admin_status(State(state): State<DirState>) -> impl IntoResponse {
    let servers = state.registry.servers();
    let counts = state.store.counts();
    match (servers, counts) {
        (Ok(servers), Ok(counts)) => (
            StatusCode::OK,
            Json(json!({
                "backend": state.store.name(),
                "placement_cursor": state.registry.cursor_position(),
                "users": counts.users,
                "files": counts.files,
                "servers": servers
                    .iter()
                    .enumerate()
                    .map(|(i, s)| json!({ "rank": i + 1, "id": s.id, "address": s.address }))
                    .collect::<Vec<_>>(),
                "uptime_secs": state.metrics.uptime().as_secs(),
            })),
        ),
        (Err(e), _) | (_, Err(e)) => (
            e.to_http_status(),
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<DirState>) -> impl IntoResponse {
    (StatusCode::OK, state.metrics.to_prometheus())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{encode_transport, MemStore};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn router() -> (Router, DirState) {
        let state = DirState::new(Arc::new(MemStore::new()), AuditLogger::disabled());
        (create_router(state.clone(), 64 * 1024), state)
    }

    async fn call(router: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        let body = body.to_string();
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("content-length", body.len())
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_next_server_route() {
        let (router, state) = router();
        let req = Request::builder()
            .uri("/servers/next")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(&router, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["address"], "");

        state.registry.register_server(1, "A").unwrap();
        let req = Request::builder()
            .uri("/servers/next")
            .body(Body::empty())
            .unwrap();
        let (_, body) = call(&router, req).await;
        assert_eq!(body["address"], "A");
    }

    #[tokio::test]
    async fn test_create_account_projects_to_bool() {
        let (router, _) = router();
        let body = json!({
            "username": "alice",
            "password_hash": encode_transport("h"),
            "salt": encode_transport("s"),
        });
        let (_, first) = call(&router, post_json("/accounts", body.clone())).await;
        let (_, second) = call(&router, post_json("/accounts", body)).await;
        assert_eq!(first["ok"], true);
        assert_eq!(second["ok"], false);

        let bad = json!({ "username": "bob", "password_hash": "***", "salt": "***" });
        let (status, third) = call(&router, post_json("/accounts", bad)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(third["ok"], false);
    }

    #[tokio::test]
    async fn test_unknown_user_credentials_are_null() {
        let (router, _) = router();
        let req = Request::builder()
            .uri("/accounts?username=ghost")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(&router, req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["credentials"].is_null());
    }

    #[tokio::test]
    async fn test_not_found_counts_as_failure_outside_lookup() {
        let (router, state) = router();
        let req = Request::builder()
            .uri("/accounts?username=ghost")
            .body(Body::empty())
            .unwrap();
        call(&router, req).await;
        assert_eq!(state.metrics.failures("lookup_credentials"), 0);

        let folded = state.settle::<()>(
            "remove_file",
            Instant::now(),
            Err(crate::common::Error::NotFound("docs/a".into())),
        );
        assert!(folded.is_none());
        assert_eq!(state.metrics.failures("remove_file"), 1);
    }

    #[tokio::test]
    async fn test_unregister_reports_cascade() {
        let (router, state) = router();
        let user = state.store.insert_user("alice", "h", "s").unwrap();
        state.registry.register_server(2, "B").unwrap();
        state
            .catalog
            .record_files(&[NewFileRecord {
                user_id: user,
                server_id: 2,
                path: "docs/a".into(),
                filename: "a".into(),
                is_backup: false,
                file_hash: "h0".into(),
                last_modified: 0,
            }])
            .unwrap();

        let req = Request::builder()
            .method("DELETE")
            .uri("/servers/2")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(&router, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["files_removed"], 1);
        assert_eq!(body["server_existed"], true);
        assert_eq!(state.store.counts().unwrap().files, 0);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let (router, _) = router();
        let prefixes: Vec<String> = (0..10_000).map(|i| format!("dir-{}", i)).collect();
        let req = post_json("/users/1/listing", json!({ "prefixes": prefixes }));
        let (status, _) = call(&router, req).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }
}
