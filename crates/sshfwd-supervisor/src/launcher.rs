//! Launching `ssh -L` forward processes
//!
//! The launcher only spawns: it never waits on the child. Ownership of the
//! [`Child`] moves to the exit watcher right after a successful launch.

use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::drain::spawn_log_drain;
use crate::error::{Result, SupervisorError};
use crate::model::{Tunnel, TunnelStatus};

/// Locations tried, in order, after a `PATH` lookup for `ssh` fails
const SSH_FALLBACK_PATHS: &[&str] = &["/usr/bin/ssh", "/data/data/com.termux/files/usr/bin/ssh"];

/// Locate the ssh executable.
///
/// Searches `PATH` first (honouring `PATHEXT` on Windows), then a few
/// well-known locations. The result is what every launch uses, so it should
/// be resolved once at startup.
pub fn discover_ssh() -> Result<PathBuf> {
    resolve_executable("ssh", SSH_FALLBACK_PATHS)
}

fn resolve_executable(name: &str, fallbacks: &[&str]) -> Result<PathBuf> {
    if let Ok(path) = which::which(name) {
        return Ok(path);
    }

    fallbacks
        .iter()
        .find_map(|candidate| which::which(candidate).ok())
        .ok_or(SupervisorError::SshNotFound)
}

/// The ssh program and any extra arguments placed before the forward
/// arguments (e.g. `-i ~/.ssh/id_tunnel` or `-o ServerAliveInterval=30`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshCommand {
    pub program: PathBuf,
    pub extra_args: Vec<String>,
}

impl SshCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    /// Use the discovered ssh executable.
    pub fn discover() -> Result<Self> {
        discover_ssh().map(Self::new)
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Full argument list for a tunnel, excluding the program itself.
    ///
    /// `ExitOnForwardFailure` makes ssh exit when the local bind fails, so a
    /// broken forward is observed as a process exit.
    pub fn args_for(&self, tunnel: &Tunnel) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.extend([
            "-o".to_string(),
            "ExitOnForwardFailure=yes".to_string(),
            "-N".to_string(),
            "-L".to_string(),
            tunnel.forward_spec(),
            tunnel.conn_addr.clone(),
        ]);
        args
    }

    fn command_for(&self, tunnel: &Tunnel) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args_for(tunnel))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Outcome of a single launch attempt
#[derive(Debug)]
pub struct Launch {
    pub status: TunnelStatus,
    /// Present iff the process started
    pub child: Option<Child>,
    /// Log drain for the child's stderr, if it could be captured
    pub drain: Option<JoinHandle<()>>,
}

/// Spawns forward processes for tunnel definitions
#[derive(Debug, Clone)]
pub struct Launcher {
    ssh: SshCommand,
}

impl Launcher {
    pub fn new(ssh: SshCommand) -> Self {
        Self { ssh }
    }

    pub fn ssh(&self) -> &SshCommand {
        &self.ssh
    }

    /// Start the forward process for `tunnel`.
    ///
    /// A spawn failure is logged and reported as [`TunnelStatus::Disconnected`];
    /// it is never an error. Must be called from within a tokio runtime.
    pub fn launch(&self, tunnel: &Tunnel, tasks: &TaskTracker) -> Launch {
        let mut cmd = self.ssh.command_for(tunnel);
        debug!(
            "[{}] {} {}",
            tunnel.name,
            self.ssh.program.display(),
            self.ssh.args_for(tunnel).join(" ")
        );

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("[{}] Cannot start SSH session: {}", tunnel.name, e);
                return Launch {
                    status: TunnelStatus::Disconnected,
                    child: None,
                    drain: None,
                };
            }
        };

        let drain = match child.stderr.take() {
            Some(stderr) => Some(spawn_log_drain(tunnel.name.clone(), stderr, tasks)),
            None => {
                warn!("[{}] Cannot log SSH session output", tunnel.name);
                None
            }
        };

        info!(
            "[{}] SSH session started (pid {:?}) forwarding {} via {}",
            tunnel.name,
            child.id(),
            tunnel.forward_spec(),
            tunnel.conn_addr
        );

        Launch {
            status: TunnelStatus::Online,
            child: Some(child),
            drain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tunnel() -> Tunnel {
        Tunnel {
            id: "t1".to_string(),
            name: "db".to_string(),
            enabled: true,
            local_port: 5432,
            host: "db.internal".to_string(),
            remote_port: 5432,
            conn_addr: "jump@bastion".to_string(),
            autoreboot: false,
        }
    }

    #[test]
    fn test_args_for() {
        let ssh = SshCommand::new("/usr/bin/ssh");
        assert_eq!(
            ssh.args_for(&tunnel()),
            vec![
                "-o",
                "ExitOnForwardFailure=yes",
                "-N",
                "-L",
                "5432:db.internal:5432",
                "jump@bastion"
            ]
        );
    }

    #[test]
    fn test_extra_args_come_first() {
        let ssh = SshCommand::new("ssh").with_args(["-i", "/keys/tunnel"]);
        let args = ssh.args_for(&tunnel());
        assert_eq!(&args[..2], &["-i", "/keys/tunnel"]);
        assert_eq!(args.last().map(String::as_str), Some("jump@bastion"));
    }

    #[tokio::test]
    async fn test_launch_missing_executable() {
        let launcher = Launcher::new(SshCommand::new("/nonexistent/sshfwd-test-ssh"));
        let launch = launcher.launch(&tunnel(), &TaskTracker::new());
        assert_eq!(launch.status, TunnelStatus::Disconnected);
        assert!(launch.child.is_none());
        assert!(launch.drain.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_success() {
        let launcher = Launcher::new(
            SshCommand::new("/bin/sh").with_args(["-c", "exec sleep 30", "ssh"]),
        );
        let tasks = TaskTracker::new();
        let launch = launcher.launch(&tunnel(), &tasks);
        assert_eq!(launch.status, TunnelStatus::Online);
        // The stderr drain runs on the caller's tracker
        assert_eq!(tasks.len(), 1);

        let mut child = launch.child.expect("child should be running");
        assert!(child.id().is_some());
        child.kill().await.unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_executable_from_path() {
        let path = resolve_executable("sh", &[]).unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("sh"));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_executable_fallbacks() {
        let path = resolve_executable(
            "sshfwd-no-such-binary",
            &["/nonexistent/ssh", "/bin/sh"],
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("/bin/sh"));

        // Directories and missing files are skipped
        assert!(matches!(
            resolve_executable("sshfwd-no-such-binary", &["/", "/nonexistent/ssh"]),
            Err(SupervisorError::SshNotFound)
        ));
    }
}
