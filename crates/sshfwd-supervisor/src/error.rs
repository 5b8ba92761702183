//! Supervisor errors

use thiserror::Error;

/// Errors surfaced by supervisor registry operations.
///
/// Process-level failures (spawn, kill) are not errors here: they are
/// logged and reflected in [`TunnelStatus`](crate::TunnelStatus).
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Tunnel not found: {0}")]
    NotFound(String),

    #[error("Invalid tunnel: {0}")]
    InvalidTunnel(String),

    #[error("No ssh executable found (searched PATH, /usr/bin/ssh and the Termux prefix)")]
    SshNotFound,
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
