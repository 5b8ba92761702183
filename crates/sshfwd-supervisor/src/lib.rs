//! SSH forward supervisor
//!
//! Keeps a set of `ssh -N -L` port-forward processes in their declared
//! state: launches enabled tunnels, watches for exits, relaunches
//! auto-reboot tunnels after a backoff and tears processes down on stop.

pub mod drain;
pub mod error;
pub mod id;
pub mod launcher;
pub mod model;
pub mod reboot;
pub mod record;
pub mod supervisor;
mod watcher;

pub use error::{Result, SupervisorError};
pub use id::{generate_id, ID_LENGTH};
pub use launcher::{discover_ssh, Launch, Launcher, SshCommand};
pub use model::{NewTunnel, Tunnel, TunnelStatus, TunnelStatusEntry};
pub use reboot::DEFAULT_REBOOT_BACKOFF;
pub use record::{ProcessRecord, RESTART_CHANNEL_CAPACITY};
pub use supervisor::{Supervisor, SupervisorConfig, DEFAULT_STOP_TIMEOUT};
