//! Live state of one active tunnel
//!
//! A [`ProcessRecord`] exists exactly while its tunnel is active. It is
//! shared (`Arc`) between the supervisor, the exit watcher of its current
//! process and, when auto-reboot is on, one auto-reboot loop.
//!
//! Signalling is split in two:
//! - a [`CancellationToken`] for explicit stop, observed by the loop
//! - a bounded restart-request channel written by exit watchers with
//!   `try_send`, read only by the loop
//!
//! Relaunch and teardown both go through the `process` mutex, and relaunch
//! re-checks cancellation while holding it. A stop therefore either sees the
//! replacement process (and kills it) or prevents it from being launched.
//!
//! Every task bound to the record (exit watchers, log drains, the auto-reboot
//! loop) is spawned on its [`TaskTracker`]; shutdown closes the tracker and
//! waits for it to drain.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::launcher::{Launch, Launcher};
use crate::model::{Tunnel, TunnelStatus};
use crate::watcher::spawn_exit_watcher;

/// Capacity of the restart-request channel. Two slots let an exit watcher
/// enqueue without a consumer (auto-reboot off) and still leave room for a
/// request racing a relaunch.
pub const RESTART_CHANNEL_CAPACITY: usize = 2;

/// How long stop waits for the log drain after the process is gone, and
/// for the remaining tracked tasks after that
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Sent by an exit watcher after its process terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RestartRequest;

/// Handle on the currently running forward process
struct ProcessHandle {
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    watcher: JoinHandle<()>,
    drain: Option<JoinHandle<()>>,
}

impl ProcessHandle {
    /// Ask the exit watcher to kill the process, then wait for it to finish.
    async fn terminate(mut self, tunnel_name: &str, stop_timeout: Duration) {
        debug!("[{}] Stopping SSH session (pid {:?})", tunnel_name, self.pid);

        if let Some(kill_tx) = self.kill_tx.take() {
            // Fails only if the watcher already saw the process exit
            let _ = kill_tx.send(());
        }

        match tokio::time::timeout(stop_timeout, &mut self.watcher).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("[{}] Exit watcher failed: {}", tunnel_name, e),
            Err(_) => {
                warn!(
                    "[{}] SSH session did not exit within {:?}, abandoning it",
                    tunnel_name, stop_timeout
                );
                self.watcher.abort();
            }
        }

        if let Some(mut drain) = self.drain.take() {
            if tokio::time::timeout(DRAIN_GRACE, &mut drain).await.is_err() {
                drain.abort();
            }
        }
    }

    /// Drop the handle of a process that already exited.
    ///
    /// Its drain is aborted: anything still holding the stream open is a
    /// leftover of the old session.
    fn discard(self, tunnel_name: &str) {
        if let Some(drain) = self.drain {
            if !drain.is_finished() {
                debug!("[{}] Dropping output of previous SSH session", tunnel_name);
                drain.abort();
            }
        }
    }
}

/// Runtime state bundle for one active tunnel
pub struct ProcessRecord {
    tunnel: Tunnel,
    status: watch::Sender<TunnelStatus>,
    cancel: CancellationToken,
    restart_tx: mpsc::Sender<RestartRequest>,
    restart_rx: Mutex<Option<mpsc::Receiver<RestartRequest>>>,
    process: tokio::sync::Mutex<Option<ProcessHandle>>,
    reboot_task: Mutex<Option<JoinHandle<()>>>,
    tasks: TaskTracker,
}

impl ProcessRecord {
    pub(crate) fn new(tunnel: Tunnel) -> Arc<Self> {
        let (restart_tx, restart_rx) = mpsc::channel(RESTART_CHANNEL_CAPACITY);
        let (status, _) = watch::channel(TunnelStatus::Disconnected);

        Arc::new(Self {
            tunnel,
            status,
            cancel: CancellationToken::new(),
            restart_tx,
            restart_rx: Mutex::new(Some(restart_rx)),
            process: tokio::sync::Mutex::new(None),
            reboot_task: Mutex::new(None),
            tasks: TaskTracker::new(),
        })
    }

    /// Snapshot of the definition this record was launched from
    pub fn tunnel(&self) -> &Tunnel {
        &self.tunnel
    }

    pub fn status(&self) -> TunnelStatus {
        *self.status.borrow()
    }

    /// Watch status transitions
    pub fn subscribe(&self) -> watch::Receiver<TunnelStatus> {
        self.status.subscribe()
    }

    /// OS pid of the current process, if one is running
    pub async fn pid(&self) -> Option<u32> {
        self.process.lock().await.as_ref().and_then(|p| p.pid)
    }

    /// Whether stop has been issued for this record
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Number of watcher, drain and auto-reboot tasks still alive
    pub fn running_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn set_status(&self, status: TunnelStatus) {
        self.status.send_replace(status);
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    /// Queue a restart request without waiting.
    ///
    /// Returns false when the channel is full; the request is dropped since
    /// one is already pending.
    pub(crate) fn request_restart(&self) -> bool {
        self.restart_tx.try_send(RestartRequest).is_ok()
    }

    /// Hand the restart receiver to the auto-reboot loop. Only the first
    /// caller gets it.
    pub(crate) fn take_restart_rx(&self) -> Option<mpsc::Receiver<RestartRequest>> {
        self.restart_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    pub(crate) fn set_reboot_task(&self, task: JoinHandle<()>) {
        if let Ok(mut slot) = self.reboot_task.lock() {
            *slot = Some(task);
        }
    }

    /// Launch a process for this record, replacing the previous handle.
    ///
    /// Returns false without launching if the record was cancelled.
    pub(crate) async fn launch(self: &Arc<Self>, launcher: &Launcher) -> bool {
        let mut slot = self.process.lock().await;
        if self.cancel.is_cancelled() {
            return false;
        }

        if let Some(previous) = slot.take() {
            previous.discard(&self.tunnel.name);
        }

        let Launch {
            status,
            child,
            drain,
        } = launcher.launch(&self.tunnel, &self.tasks);
        self.set_status(status);

        *slot = child.map(|child| {
            let (kill_tx, kill_rx) = oneshot::channel();
            let pid = child.id();
            let watcher = spawn_exit_watcher(self.clone(), child, kill_rx);
            ProcessHandle {
                pid,
                kill_tx: Some(kill_tx),
                watcher,
                drain,
            }
        });

        true
    }

    /// Cancel the record, kill its process and wait for every task bound
    /// to it to finish.
    pub(crate) async fn shutdown(&self, stop_timeout: Duration) {
        self.cancel.cancel();

        let handle = self.process.lock().await.take();
        if let Some(handle) = handle {
            handle.terminate(&self.tunnel.name, stop_timeout).await;
        }

        let reboot_task = self.reboot_task.lock().ok().and_then(|mut t| t.take());
        if let Some(task) = reboot_task {
            if let Err(e) = task.await {
                warn!("[{}] Auto-reboot task failed: {}", self.tunnel.name, e);
            }
        }

        self.set_status(TunnelStatus::Disconnected);

        // Cancelled: nothing spawns onto the tracker from here on
        self.tasks.close();
        if tokio::time::timeout(DRAIN_GRACE, self.tasks.wait())
            .await
            .is_err()
        {
            warn!(
                "[{}] {} task(s) still running after stop",
                self.tunnel.name,
                self.tasks.len()
            );
        }
    }
}
