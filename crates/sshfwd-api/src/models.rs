use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use sshfwd_supervisor::{NewTunnel, Tunnel, TunnelStatusEntry};

/// Every tunnel with its live status
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TunnelStatusList {
    pub tunnel_status: Vec<TunnelStatusEntry>,
}

/// Outcome message; also the body of every error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}

/// Response to a successful add
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddTunnelResponse {
    pub status: String,
    /// Identifier assigned to the new tunnel
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RemoveTunnelRequest {
    pub id: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Tunnels with a live process record
    pub active_tunnels: usize,
}
