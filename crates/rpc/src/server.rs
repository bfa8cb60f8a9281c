use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use docreg_registry::{DocumentRegistry, RegistryError};
use docreg_time::Clock;
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::auth::ReplayGuard;

use crate::documents::{
    handle_get_document, handle_list_documents, handle_list_owned, handle_register,
    handle_transfer,
};

pub const DEFAULT_MAX_CLOCK_SKEW_SECS: u64 = 300;

/// Request bodies carry at most a few kilobytes of metadata.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<DocumentRegistry>,
    /// Reference time for signed-request freshness checks.
    pub clock: Arc<dyn Clock>,
    pub max_clock_skew_secs: u64,
    /// Transfers already accepted by this node.
    pub replay_guard: Arc<ReplayGuard>,
    pub start_time: Instant,
    pub req_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(registry: Arc<DocumentRegistry>, clock: Arc<dyn Clock>) -> Self {
        let replay_guard = Arc::new(ReplayGuard::new(clock.now()));
        Self {
            registry,
            clock,
            max_clock_skew_secs: DEFAULT_MAX_CLOCK_SKEW_SECS,
            replay_guard,
            start_time: Instant::now(),
            req_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_max_clock_skew(mut self, secs: u64) -> Self {
        self.max_clock_skew_secs = secs;
        self
    }

    pub(crate) fn record_request(&self) -> u64 {
        self.req_count.fetch_add(1, Ordering::Relaxed) as u64 + 1
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

pub(crate) type SharedState = Arc<AppState>;

/// Run `op` against the registry on the blocking pool.
///
/// Registry calls take a blocking lock and, with sled, do disk I/O.
pub(crate) async fn run_blocking<T, F>(state: &SharedState, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&DocumentRegistry) -> std::result::Result<T, RegistryError> + Send + 'static,
    T: Send + 'static,
{
    let registry = Arc::clone(&state.registry);
    match tokio::task::spawn_blocking(move || op(&registry)).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(err) => {
            error!(error = %err, "registry task failed");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                err.to_string(),
            ))
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    documents: usize,
    uptime_secs: u64,
    req_total: u64,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    git_commit: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

/// Error returned by every handler: an HTTP status, a stable kind string and
/// a human-readable message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new<S: Into<String>>(status: StatusCode, kind: &'static str, message: S) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    pub fn bad_request<S: Into<String>>(kind: &'static str, message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, kind, message)
    }

    pub fn unauthenticated<S: Into<String>>(kind: &'static str, message: S) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, kind, message)
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        let status = match &err {
            RegistryError::AlreadyRegistered { .. } | RegistryError::NoOpTransfer { .. } => {
                StatusCode::CONFLICT
            }
            RegistryError::NotFound { .. } => StatusCode::NOT_FOUND,
            RegistryError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            RegistryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RegistryError::Inconsistent(_) | RegistryError::Storage(_) => {
                error!(error = %err, "registry failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.kind(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let payload = Json(ErrorResponse {
            error: self.kind,
            message: self.message,
        });
        (self.status, payload).into_response()
    }
}

pub async fn start_server(state: AppState, addr: &str) -> Result<()> {
    let shared = Arc::new(state);
    let app = build_router(shared);
    let listener = bind_listener(addr).await?;
    info!("RPC server listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .await
        .context("RPC server terminated unexpectedly")
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind RPC listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind RPC listener on {addr}"))
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/version", get(handle_version))
        .route("/documents", post(handle_register).get(handle_list_documents))
        .route("/documents/:fingerprint", get(handle_get_document))
        .route("/documents/:fingerprint/transfer", post(handle_transfer))
        .route("/owners/:owner/documents", get(handle_list_owned))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_health(State(state): State<SharedState>) -> Result<Json<HealthResponse>, ApiError> {
    let req_total = state.record_request();
    let documents = run_blocking(&state, |registry| registry.count()).await?;

    Ok(Json(HealthResponse {
        status: "ok",
        documents,
        uptime_secs: state.uptime_seconds(),
        req_total,
    }))
}

async fn handle_version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        git_commit: option_env!("GIT_COMMIT_HASH"),
    })
}
