//! Auto-reboot loop
//!
//! One task per auto-reboot tunnel, alive for the tunnel's whole active
//! lifetime. Each iteration waits for a restart request, sleeps the
//! backoff, then relaunches into the same record. Cancellation wins over
//! both waits.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::launcher::Launcher;
use crate::record::{ProcessRecord, RestartRequest};

/// Default delay between an observed exit and the relaunch
pub const DEFAULT_REBOOT_BACKOFF: Duration = Duration::from_secs(30);

/// Spawn the auto-reboot loop for `record`.
///
/// Returns `None` if a loop was already started for this record.
pub(crate) fn spawn_auto_reboot(
    record: Arc<ProcessRecord>,
    launcher: Arc<Launcher>,
    backoff: Duration,
) -> Option<JoinHandle<()>> {
    let restart_rx = record.take_restart_rx()?;
    let tasks = record.tasks().clone();
    Some(tasks.spawn(run_auto_reboot(
        record, launcher, backoff, restart_rx,
    )))
}

async fn run_auto_reboot(
    record: Arc<ProcessRecord>,
    launcher: Arc<Launcher>,
    backoff: Duration,
    mut restart_rx: mpsc::Receiver<RestartRequest>,
) {
    let name = record.tunnel().name.clone();
    let cancel = record.cancellation().clone();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            request = restart_rx.recv() => {
                if request.is_none() {
                    break;
                }
            }
        }

        info!("[{}] Autorebooting in {:?}", name, backoff);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(backoff) => {}
        }

        if !record.launch(&launcher).await {
            break;
        }
        info!("[{}] Autorebooted, status {}", name, record.status());
    }

    debug!("[{}] Exiting autoreboot", name);
}
