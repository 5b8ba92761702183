//! Daemon mode
//!
//! Loads stored tunnels, starts the enabled ones, serves the REST API and
//! periodically persists the definitions until shutdown.

use anyhow::{Context, Result};
use sshfwd_api::ApiServer;
use sshfwd_store::TunnelStore;
use sshfwd_supervisor::Supervisor;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DaemonConfig;

/// Daemon wiring store, supervisor and API together
pub struct Daemon {
    config: DaemonConfig,
    store: TunnelStore,
}

impl Daemon {
    pub fn new(config: DaemonConfig) -> Self {
        let store = TunnelStore::new(config.tunnels_file.clone());
        Self { config, store }
    }

    /// Run until `shutdown` resolves.
    ///
    /// Every process is stopped and the definitions are saved before this
    /// returns, including when the API server fails.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Daemon starting...");

        // Refuse to start rather than overwrite a file we cannot read
        let tunnels = self
            .store
            .load()
            .context("Failed to load tunnel definitions")?;
        info!(
            "Loaded {} tunnel(s) from {:?}",
            tunnels.len(),
            self.store.path()
        );

        let supervisor_config = self.config.supervisor_config()?;
        info!("Using ssh at {:?}", supervisor_config.ssh.program);

        let supervisor = Arc::new(Supervisor::new(supervisor_config, tunnels));
        supervisor.boot().await;

        let cancel = CancellationToken::new();
        let autosaver = self.config.autosave_interval().map(|interval| {
            spawn_autosaver(
                supervisor.clone(),
                self.store.clone(),
                interval,
                cancel.clone(),
            )
        });

        info!("Daemon ready");

        let served = ApiServer::new(self.config.api_config(), supervisor.clone())
            .start(shutdown)
            .await;
        if let Err(e) = &served {
            error!("API server failed: {}", e);
        }

        info!("Shutting down daemon...");
        cancel.cancel();
        if let Some(autosaver) = autosaver {
            if let Err(e) = autosaver.await {
                warn!("Autosave task failed: {}", e);
            }
        }

        supervisor.shutdown().await;

        self.store
            .save(&supervisor.tunnels().await)
            .context("Failed to save tunnel definitions")?;
        info!("Saved tunnel definitions to {:?}", self.store.path());

        served
    }
}

/// Persist the definitions every `interval` until `cancel` fires.
pub fn spawn_autosaver(
    supervisor: Arc<Supervisor>,
    store: TunnelStore,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let tunnels = supervisor.tunnels().await;
                    match store.save(&tunnels) {
                        Ok(()) => debug!("Autosaved {} tunnel(s)", tunnels.len()),
                        Err(e) => warn!("Autosave failed: {}", e),
                    }
                }
            }
        }

        debug!("Autosave stopped");
    })
}
