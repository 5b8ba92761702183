//! Daemon configuration
//!
//! Optional JSON file, by default `~/.sshfwd/config.json`. Every field has a
//! default, so a partial file (or none at all) is valid. Command-line flags
//! override what the file says.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sshfwd_api::{ApiServerConfig, DEFAULT_BIND_ADDR};
use sshfwd_store::DEFAULT_TUNNELS_FILE;
use sshfwd_supervisor::{SshCommand, SupervisorConfig};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Address the REST API listens on
    pub bind_addr: SocketAddr,
    /// Where tunnel definitions are persisted
    pub tunnels_file: PathBuf,
    /// ssh executable; discovered from `PATH` when unset
    pub ssh_path: Option<PathBuf>,
    /// Extra arguments placed before the forward arguments
    pub ssh_args: Vec<String>,
    /// Delay before an auto-reboot relaunch
    pub reboot_backoff_secs: u64,
    /// Bound on the wait for a killed process
    pub stop_timeout_secs: u64,
    /// Period of the autosave; 0 disables it (definitions are still saved
    /// on shutdown)
    pub autosave_interval_secs: u64,
    /// Web frontend served for non-API paths
    pub static_dir: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR,
            tunnels_file: PathBuf::from(DEFAULT_TUNNELS_FILE),
            ssh_path: None,
            ssh_args: Vec::new(),
            reboot_backoff_secs: 30,
            stop_timeout_secs: 10,
            autosave_interval_secs: 60,
            static_dir: None,
        }
    }
}

impl DaemonConfig {
    /// Resolve the ssh command and timings for the supervisor.
    ///
    /// Fails if no ssh path is configured and none can be discovered.
    pub fn supervisor_config(&self) -> Result<SupervisorConfig> {
        let ssh = match &self.ssh_path {
            Some(path) => SshCommand::new(path),
            None => SshCommand::discover()
                .context("Cannot find an ssh executable, set one with --ssh-path")?,
        };

        Ok(SupervisorConfig::new(ssh.with_args(self.ssh_args.iter().cloned()))
            .with_reboot_backoff(Duration::from_secs(self.reboot_backoff_secs))
            .with_stop_timeout(Duration::from_secs(self.stop_timeout_secs)))
    }

    pub fn api_config(&self) -> ApiServerConfig {
        ApiServerConfig {
            bind_addr: self.bind_addr,
            enable_cors: true,
            static_dir: self.static_dir.clone(),
        }
    }

    pub fn autosave_interval(&self) -> Option<Duration> {
        match self.autosave_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Configuration manager
pub struct ConfigManager;

impl ConfigManager {
    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".sshfwd").join("config.json"))
    }

    /// Load the configuration.
    ///
    /// An explicitly given file must exist. The default file is optional.
    pub fn load(path: Option<&Path>) -> Result<DaemonConfig> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = match Self::default_config_path() {
                    Ok(path) => path,
                    Err(_) => return Ok(DaemonConfig::default()),
                };
                if !path.exists() {
                    return Ok(DaemonConfig::default());
                }
                Self::load_from(&path)
            }
        }
    }

    fn load_from(path: &Path) -> Result<DaemonConfig> {
        let json =
            fs::read_to_string(path).context(format!("Failed to read config file: {:?}", path))?;

        let config: DaemonConfig = serde_json::from_str(&json)
            .context(format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:4140");
        assert_eq!(config.tunnels_file, PathBuf::from(".tunnels.json"));
        assert_eq!(config.reboot_backoff_secs, 30);
        assert_eq!(config.autosave_interval(), Some(Duration::from_secs(60)));
        assert!(config.ssh_path.is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(
            &path,
            r#"{"bind_addr": "0.0.0.0:9000", "ssh_args": ["-i", "/keys/tunnel"], "autosave_interval_secs": 0}"#,
        )
        .unwrap();

        let config = ConfigManager::load(Some(&path)).unwrap();
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(config.ssh_args, vec!["-i", "/keys/tunnel"]);
        assert_eq!(config.autosave_interval(), None);
        assert_eq!(config.stop_timeout_secs, 10);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let temp = TempDir::new().unwrap();
        assert!(ConfigManager::load(Some(&temp.path().join("nope.json"))).is_err());
    }

    #[test]
    fn test_supervisor_config() {
        let config = DaemonConfig {
            ssh_path: Some(PathBuf::from("/opt/ssh")),
            ssh_args: vec!["-p".to_string(), "2222".to_string()],
            reboot_backoff_secs: 5,
            ..Default::default()
        };

        let supervisor = config.supervisor_config().unwrap();
        assert_eq!(supervisor.ssh.program, PathBuf::from("/opt/ssh"));
        assert_eq!(supervisor.ssh.extra_args, vec!["-p", "2222"]);
        assert_eq!(supervisor.reboot_backoff, Duration::from_secs(5));
        assert_eq!(supervisor.stop_timeout, Duration::from_secs(10));
    }
}
