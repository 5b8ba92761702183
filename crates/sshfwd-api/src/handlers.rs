use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use sshfwd_supervisor::SupervisorError;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::models::*;
use crate::AppState;

type ApiError = (StatusCode, Json<StatusResponse>);

fn invalid_json(rejection: JsonRejection) -> ApiError {
    debug!("Rejected request body: {}", rejection);
    (
        StatusCode::BAD_REQUEST,
        Json(StatusResponse::new("Invalid JSON!")),
    )
}

fn supervisor_error(err: SupervisorError) -> ApiError {
    match err {
        SupervisorError::NotFound(id) => {
            debug!("Tunnel not found: {}", id);
            (
                StatusCode::NOT_FOUND,
                Json(StatusResponse::new("Tunnel not found")),
            )
        }
        SupervisorError::InvalidTunnel(reason) => {
            warn!("Rejected tunnel definition: {}", reason);
            (
                StatusCode::BAD_REQUEST,
                Json(StatusResponse::new(format!("Invalid tunnel: {}", reason))),
            )
        }
        other => {
            error!("Supervisor error: {}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusResponse::new(other.to_string())),
            )
        }
    }
}

/// List every tunnel with its live status
#[utoipa::path(
    get,
    path = "/api/v1/tunnel_status",
    responses(
        (status = 200, description = "All tunnels", body = TunnelStatusList)
    ),
    tag = "tunnels"
)]
pub async fn tunnel_status(State(state): State<Arc<AppState>>) -> Json<TunnelStatusList> {
    Json(TunnelStatusList {
        tunnel_status: state.supervisor.status().await,
    })
}

/// Add a tunnel and start it if enabled
#[utoipa::path(
    post,
    path = "/api/v1/add_tunnel",
    request_body = NewTunnel,
    responses(
        (status = 200, description = "Tunnel added", body = AddTunnelResponse),
        (status = 400, description = "Invalid request body", body = StatusResponse)
    ),
    tag = "tunnels"
)]
pub async fn add_tunnel(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewTunnel>, JsonRejection>,
) -> Result<Json<AddTunnelResponse>, ApiError> {
    let Json(new) = payload.map_err(invalid_json)?;

    let tunnel = state
        .supervisor
        .create(new)
        .await
        .map_err(supervisor_error)?;

    info!("Added tunnel '{}' ({})", tunnel.name, tunnel.id);
    Ok(Json(AddTunnelResponse {
        status: "Tunnel added".to_string(),
        id: tunnel.id,
    }))
}

/// Stop and delete a tunnel
#[utoipa::path(
    post,
    path = "/api/v1/remove_tunnel",
    request_body = RemoveTunnelRequest,
    responses(
        (status = 200, description = "Tunnel deleted", body = StatusResponse),
        (status = 400, description = "Invalid request body", body = StatusResponse),
        (status = 404, description = "Tunnel not found", body = StatusResponse)
    ),
    tag = "tunnels"
)]
pub async fn remove_tunnel(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RemoveTunnelRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(request) = payload.map_err(invalid_json)?;

    state
        .supervisor
        .delete(&request.id)
        .await
        .map_err(supervisor_error)?;

    Ok(Json(StatusResponse::new("Tunnel deleted")))
}

/// Replace a tunnel definition and reconcile its process
#[utoipa::path(
    patch,
    path = "/api/v1/update_tunnel",
    request_body = Tunnel,
    responses(
        (status = 200, description = "Tunnel updated", body = StatusResponse),
        (status = 400, description = "Invalid request body", body = StatusResponse),
        (status = 404, description = "Tunnel not found", body = StatusResponse)
    ),
    tag = "tunnels"
)]
pub async fn update_tunnel(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Tunnel>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(tunnel) = payload.map_err(invalid_json)?;

    state
        .supervisor
        .update(tunnel)
        .await
        .map_err(supervisor_error)?;

    Ok(Json(StatusResponse::new("Updated tunnel settings")))
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_tunnels: state.supervisor.active_count().await,
    })
}
