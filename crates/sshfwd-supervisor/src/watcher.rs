//! Exit detection for forward processes

use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::model::TunnelStatus;
use crate::record::ProcessRecord;

/// Spawn the exit watcher for `child`, which it takes ownership of.
///
/// The watcher finishes when the process terminates for any reason. A
/// message on `kill_rx` makes it kill and reap the process first. Either
/// way it then marks the record disconnected and queues a restart request.
pub(crate) fn spawn_exit_watcher(
    record: Arc<ProcessRecord>,
    child: Child,
    kill_rx: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    let tasks = record.tasks().clone();
    tasks.spawn(watch_exit(record, child, kill_rx))
}

async fn watch_exit(
    record: Arc<ProcessRecord>,
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
) {
    let name = record.tunnel().name.clone();

    tokio::select! {
        result = child.wait() => log_exit(&name, result),
        Ok(()) = kill_rx => {
            match child.kill().await {
                Ok(()) => info!("[{}] SSH session terminated", name),
                Err(e) => {
                    warn!("[{}] Cannot kill SSH session: {}", name, e);
                    log_exit(&name, child.wait().await);
                }
            }
        }
    }

    record.set_status(TunnelStatus::Disconnected);
    if !record.request_restart() {
        debug!("[{}] Restart request already pending", name);
    }
}

fn log_exit(name: &str, result: io::Result<ExitStatus>) {
    match result {
        Ok(status) => info!("[{}] SSH session exited ({})", name, status),
        Err(e) => warn!("[{}] Failed to wait for SSH session: {}", name, e),
    }
}
