//! REST handlers. Each handler translates one request into one supervisor
//! call and wraps the outcome in the JSON envelope
//! `{success, message?, data?, error?}`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::ServerState;
use crate::config::ServiceConfig;
use crate::errors::DaemonError;
use crate::process::format_uptime;

pub(crate) fn router() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/api/daemon/status", get(daemon_status))
        .route("/api/services", get(list_services))
        .route("/api/services", post(create_service))
        .route("/api/services/{name}", get(get_service))
        .route("/api/services/{name}", put(update_service))
        .route("/api/services/{name}", delete(delete_service))
        .route("/api/services/{name}/start", post(start_service))
        .route("/api/services/{name}/stop", post(stop_service))
        .route("/api/services/{name}/restart", post(restart_service))
        .route("/api/services/{name}/logs", get(get_logs))
}

#[derive(Serialize)]
pub(crate) struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    fn message(message: &str) -> Self {
        Self {
            success: true,
            message: Some(message.to_string()),
            data: None,
            error: None,
        }
    }

    fn data(data: impl Serialize) -> Self {
        Self {
            success: true,
            message: None,
            data: serde_json::to_value(data).ok(),
            error: None,
        }
    }

    fn error(error: String) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(error),
        }
    }
}

type HandlerResult = std::result::Result<(StatusCode, Json<ApiResponse>), (StatusCode, Json<ApiResponse>)>;

/// Map a supervisor error to the envelope plus status code: 404 for an
/// unknown name, 400 for everything the caller can fix.
fn daemon_err(e: DaemonError) -> (StatusCode, Json<ApiResponse>) {
    let status = match &e {
        DaemonError::ServiceNotFound(_) => StatusCode::NOT_FOUND,
        DaemonError::Io(_) | DaemonError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(ApiResponse::error(e.to_string())))
}

fn bad_request(message: String) -> (StatusCode, Json<ApiResponse>) {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::error(message)))
}

#[derive(Serialize)]
struct DaemonStatus {
    running: bool,
    pid: u32,
    started_at: DateTime<Utc>,
    uptime: String,
    service_count: usize,
    running_count: usize,
    stopped_count: usize,
    failed_count: usize,
}

// GET /api/daemon/status
async fn daemon_status(State(state): State<Arc<ServerState>>) -> HandlerResult {
    let stats = state.supervisor.stats();
    let uptime = (Utc::now() - state.started_at)
        .to_std()
        .unwrap_or_default();

    let status = DaemonStatus {
        running: true,
        pid: std::process::id(),
        started_at: state.started_at,
        uptime: format_uptime(uptime),
        service_count: stats.total,
        running_count: stats.running,
        stopped_count: stats.stopped,
        failed_count: stats.failed,
    };
    Ok((StatusCode::OK, Json(ApiResponse::data(status))))
}

// GET /api/services
async fn list_services(State(state): State<Arc<ServerState>>) -> HandlerResult {
    let services = state.supervisor.list_services();
    Ok((StatusCode::OK, Json(ApiResponse::data(services))))
}

// GET /api/services/{name}
async fn get_service(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> HandlerResult {
    let info = state.supervisor.service_info(&name).map_err(daemon_err)?;
    Ok((StatusCode::OK, Json(ApiResponse::data(info))))
}

// POST /api/services
async fn create_service(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<serde_json::Value>,
) -> HandlerResult {
    let cfg: ServiceConfig = serde_json::from_value(body)
        .map_err(|e| bad_request(format!("invalid request body: {e}")))?;

    state.supervisor.add_service(cfg).await.map_err(daemon_err)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::message("service created")),
    ))
}

// PUT /api/services/{name}
async fn update_service(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> HandlerResult {
    let mut cfg: ServiceConfig = serde_json::from_value(body)
        .map_err(|e| bad_request(format!("invalid request body: {e}")))?;
    cfg.name = name;

    state
        .supervisor
        .update_service(cfg)
        .await
        .map_err(daemon_err)?;
    Ok((StatusCode::OK, Json(ApiResponse::message("service updated"))))
}

// DELETE /api/services/{name}
async fn delete_service(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> HandlerResult {
    state
        .supervisor
        .remove_service(&name)
        .await
        .map_err(daemon_err)?;
    Ok((StatusCode::OK, Json(ApiResponse::message("service removed"))))
}

// POST /api/services/{name}/start
async fn start_service(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> HandlerResult {
    state
        .supervisor
        .start_service(&name)
        .await
        .map_err(daemon_err)?;
    Ok((StatusCode::OK, Json(ApiResponse::message("service started"))))
}

// POST /api/services/{name}/stop
async fn stop_service(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> HandlerResult {
    state
        .supervisor
        .stop_service(&name)
        .await
        .map_err(daemon_err)?;
    Ok((StatusCode::OK, Json(ApiResponse::message("service stopped"))))
}

// POST /api/services/{name}/restart
async fn restart_service(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> HandlerResult {
    state
        .supervisor
        .restart_service(&name)
        .await
        .map_err(daemon_err)?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::message("service restarted")),
    ))
}

#[derive(Deserialize)]
struct LogsQuery {
    #[serde(default = "default_log_lines")]
    n: usize,
}

fn default_log_lines() -> usize {
    100
}

// GET /api/services/{name}/logs?n=N
async fn get_logs(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    Query(query): Query<LogsQuery>,
) -> HandlerResult {
    let n = if query.n == 0 { default_log_lines() } else { query.n };
    let entries = state
        .supervisor
        .service_logs(&name, n)
        .map_err(daemon_err)?;
    Ok((StatusCode::OK, Json(ApiResponse::data(entries))))
}
