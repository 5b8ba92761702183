//! Forwarding of ssh diagnostic output into the log

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Spawn a task on `tasks` that logs each line of `stream` at warn level.
///
/// The task ends on EOF or on the first read error and never reopens the
/// stream. It holds no supervisor state, so nothing waits on it except a
/// bounded grace period during stop.
pub fn spawn_log_drain<R>(tunnel_name: String, stream: R, tasks: &TaskTracker) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tasks.spawn(drain_lines(tunnel_name, stream))
}

async fn drain_lines<R>(tunnel_name: String, stream: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => warn!("[{}] ssh: {}", tunnel_name, line),
            Ok(None) => {
                debug!("[{}] SSH output closed", tunnel_name);
                break;
            }
            Err(e) => {
                debug!("[{}] Error while reading SSH output: {}", tunnel_name, e);
                break;
            }
        }
    }
}
