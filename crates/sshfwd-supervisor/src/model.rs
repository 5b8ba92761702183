//! Tunnel definitions and liveness types
//!
//! [`Tunnel`] is the durable definition persisted by the store and exchanged
//! with the API. [`TunnelStatus`] is runtime-only and exists for a tunnel
//! only while it has a live process record.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SupervisorError};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// A declared local-to-remote TCP port forward.
///
/// Field order is part of the persisted format: the store writes fields in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Tunnel {
    /// Server-assigned identifier, immutable once created
    pub id: String,
    /// Display name
    pub name: String,
    /// Desired state: whether the forward should be running
    pub enabled: bool,
    /// Port bound on the local machine
    pub local_port: u16,
    /// Destination host, resolved from the gateway's side
    pub host: String,
    /// Destination port
    pub remote_port: u16,
    /// Gateway to connect through (`user@gateway`)
    pub conn_addr: String,
    /// Relaunch the forward after it exits unexpectedly
    pub autoreboot: bool,
}

impl Tunnel {
    /// `-L` forward specification for this tunnel.
    pub fn forward_spec(&self) -> String {
        format!("{}:{}:{}", self.local_port, self.host, self.remote_port)
    }

    pub fn validate(&self) -> Result<()> {
        validate_fields(&self.name, &self.host, &self.conn_addr)
    }
}

/// Reject definitions ssh would misread.
///
/// `host` and `conn_addr` end up as ssh arguments: a leading `-` would be
/// parsed as an option.
fn validate_fields(name: &str, host: &str, conn_addr: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SupervisorError::InvalidTunnel(
            "name must not be empty".to_string(),
        ));
    }

    for (field, value) in [("host", host), ("conn_addr", conn_addr)] {
        if value.is_empty() {
            return Err(SupervisorError::InvalidTunnel(format!(
                "{} must not be empty",
                field
            )));
        }
        if value.starts_with('-') {
            return Err(SupervisorError::InvalidTunnel(format!(
                "{} must not start with '-'",
                field
            )));
        }
        if value.chars().any(char::is_whitespace) {
            return Err(SupervisorError::InvalidTunnel(format!(
                "{} must not contain whitespace",
                field
            )));
        }
    }

    Ok(())
}

/// Request body for creating a tunnel; the identifier is assigned by the
/// supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct NewTunnel {
    pub name: String,
    pub enabled: bool,
    pub local_port: u16,
    pub host: String,
    pub remote_port: u16,
    pub conn_addr: String,
    pub autoreboot: bool,
}

impl NewTunnel {
    pub fn validate(&self) -> Result<()> {
        validate_fields(&self.name, &self.host, &self.conn_addr)
    }

    /// Attach an identifier, producing the durable definition.
    pub fn with_id(self, id: String) -> Tunnel {
        Tunnel {
            id,
            name: self.name,
            enabled: self.enabled,
            local_port: self.local_port,
            host: self.host,
            remote_port: self.remote_port,
            conn_addr: self.conn_addr,
            autoreboot: self.autoreboot,
        }
    }
}

/// Liveness of a tunnel's forward process.
///
/// Serialized as its numeric value (`0`, `1`, `2`), which is what web
/// clients of the status endpoint consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TunnelStatus {
    /// No live process: never started, exited, or failed to start
    Disconnected,
    /// Reserved for an in-flight start
    Loading,
    /// Process started and has not been observed to exit
    Online,
}

impl TunnelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelStatus::Disconnected => "disconnected",
            TunnelStatus::Loading => "loading",
            TunnelStatus::Online => "online",
        }
    }
}

impl fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<TunnelStatus> for u8 {
    fn from(status: TunnelStatus) -> Self {
        match status {
            TunnelStatus::Disconnected => 0,
            TunnelStatus::Loading => 1,
            TunnelStatus::Online => 2,
        }
    }
}

impl TryFrom<u8> for TunnelStatus {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(TunnelStatus::Disconnected),
            1 => Ok(TunnelStatus::Loading),
            2 => Ok(TunnelStatus::Online),
            other => Err(format!("invalid tunnel status: {}", other)),
        }
    }
}

/// A tunnel definition joined with its live status.
///
/// `status` is absent when the tunnel has no live process record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct TunnelStatusEntry {
    pub tunnel: Tunnel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<u8>))]
    pub status: Option<TunnelStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tunnel() -> Tunnel {
        Tunnel {
            id: "abc".to_string(),
            name: "db".to_string(),
            enabled: true,
            local_port: 5432,
            host: "db.internal".to_string(),
            remote_port: 5433,
            conn_addr: "jump@bastion".to_string(),
            autoreboot: false,
        }
    }

    #[test]
    fn test_forward_spec() {
        assert_eq!(tunnel().forward_spec(), "5432:db.internal:5433");
    }

    #[test]
    fn test_status_serializes_as_number() {
        assert_eq!(serde_json::to_string(&TunnelStatus::Online).unwrap(), "2");
        assert_eq!(
            serde_json::from_str::<TunnelStatus>("0").unwrap(),
            TunnelStatus::Disconnected
        );
        assert!(serde_json::from_str::<TunnelStatus>("7").is_err());
    }

    #[test]
    fn test_status_entry_omits_missing_status() {
        let entry = TunnelStatusEntry {
            tunnel: tunnel(),
            status: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("status").is_none());
        assert_eq!(json["tunnel"]["conn_addr"], "jump@bastion");

        let entry = TunnelStatusEntry {
            tunnel: tunnel(),
            status: Some(TunnelStatus::Online),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], 2);
    }

    #[test]
    fn test_validate() {
        assert!(tunnel().validate().is_ok());

        let mut t = tunnel();
        t.name = "  ".to_string();
        assert!(matches!(
            t.validate(),
            Err(SupervisorError::InvalidTunnel(_))
        ));

        let mut t = tunnel();
        t.conn_addr = "-oProxyCommand=evil".to_string();
        assert!(t.validate().is_err());

        let mut t = tunnel();
        t.host = "db internal".to_string();
        assert!(t.validate().is_err());

        let mut t = tunnel();
        t.conn_addr = String::new();
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_new_tunnel_with_id() {
        let t = tunnel();
        let new = NewTunnel {
            name: t.name.clone(),
            enabled: t.enabled,
            local_port: t.local_port,
            host: t.host.clone(),
            remote_port: t.remote_port,
            conn_addr: t.conn_addr.clone(),
            autoreboot: t.autoreboot,
        };
        assert_eq!(new.with_id("abc".to_string()), t);
    }
}
