//! Registry of tunnel definitions and their live process records
//!
//! Both maps sit behind one async mutex that is only held for map updates
//! and launches. Operations on one tunnel are additionally serialized by a
//! per-id guard, taken before the registry lock and held across the wait for
//! a killed process, so a slow teardown never blocks other tunnels or
//! status reads.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{Result, SupervisorError};
use crate::id::{generate_id, ID_LENGTH};
use crate::launcher::{Launcher, SshCommand};
use crate::model::{NewTunnel, Tunnel, TunnelStatusEntry};
use crate::reboot::{spawn_auto_reboot, DEFAULT_REBOOT_BACKOFF};
use crate::record::ProcessRecord;

/// Upper bound on how long `stop` waits for a killed process to exit
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Supervisor configuration
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// ssh executable and extra arguments used for every launch
    pub ssh: SshCommand,
    /// Delay between an observed exit and the auto-reboot relaunch
    pub reboot_backoff: Duration,
    /// Bound on the wait for a killed process during stop
    pub stop_timeout: Duration,
}

impl SupervisorConfig {
    pub fn new(ssh: SshCommand) -> Self {
        Self {
            ssh,
            reboot_backoff: DEFAULT_REBOOT_BACKOFF,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    pub fn with_reboot_backoff(mut self, backoff: Duration) -> Self {
        self.reboot_backoff = backoff;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}

#[derive(Default)]
struct Registry {
    tunnels: HashMap<String, Tunnel>,
    procs: HashMap<String, Arc<ProcessRecord>>,
    guards: HashMap<String, Arc<Mutex<()>>>,
}

impl Registry {
    fn guard(&mut self, id: &str) -> Arc<Mutex<()>> {
        self.guards.entry(id.to_string()).or_default().clone()
    }

    /// Forget the guard of an id that has no definition.
    fn prune_guard(&mut self, id: &str) {
        if !self.tunnels.contains_key(id) {
            self.guards.remove(id);
        }
    }
}

/// Owns tunnel definitions and keeps their forward processes in the
/// desired state.
pub struct Supervisor {
    launcher: Arc<Launcher>,
    reboot_backoff: Duration,
    stop_timeout: Duration,
    registry: Mutex<Registry>,
}

impl Supervisor {
    /// Create a supervisor holding `tunnels`. Nothing is started until
    /// [`boot`](Self::boot).
    pub fn new(config: SupervisorConfig, tunnels: Vec<Tunnel>) -> Self {
        let mut registry = Registry::default();
        for tunnel in tunnels {
            if registry.tunnels.contains_key(&tunnel.id) {
                warn!(
                    "Duplicate tunnel id '{}', keeping the last definition",
                    tunnel.id
                );
            }
            registry.tunnels.insert(tunnel.id.clone(), tunnel);
        }

        Self {
            launcher: Arc::new(Launcher::new(config.ssh)),
            reboot_backoff: config.reboot_backoff,
            stop_timeout: config.stop_timeout,
            registry: Mutex::new(registry),
        }
    }

    pub fn launcher(&self) -> &Launcher {
        &self.launcher
    }

    /// Start every enabled tunnel.
    pub async fn boot(&self) {
        let enabled: Vec<String> = self
            .registry
            .lock()
            .await
            .tunnels
            .values()
            .filter(|t| t.enabled)
            .map(|t| t.id.clone())
            .collect();

        info!("Found {} enabled tunnel(s)", enabled.len());
        for id in enabled {
            self.start(&id).await;
        }
    }

    /// Launch the forward for tunnel `id`.
    ///
    /// No-op if the tunnel is unknown or already active. Waits for a stop of
    /// the same tunnel that is still in progress.
    pub async fn start(&self, id: &str) {
        let _op = self.lock_id(id).await;
        let mut registry = self.registry.lock().await;
        self.start_locked(&mut registry, id).await;
        registry.prune_guard(id);
    }

    /// Cancel auto-reboot for tunnel `id`, kill its process and wait for it.
    ///
    /// No-op if the tunnel is not active.
    pub async fn stop(&self, id: &str) {
        let _op = self.lock_id(id).await;
        let record = {
            let mut registry = self.registry.lock().await;
            let record = Self::detach(&mut registry, id);
            registry.prune_guard(id);
            record
        };
        self.teardown(record).await;
    }

    /// Store a new definition under a fresh identifier and start it if
    /// enabled.
    pub async fn create(&self, new: NewTunnel) -> Result<Tunnel> {
        new.validate()?;

        let mut registry = self.registry.lock().await;
        let id = loop {
            let candidate = generate_id(ID_LENGTH);
            if !registry.tunnels.contains_key(&candidate) {
                break candidate;
            }
            debug!("Tunnel id collision on '{}', regenerating", candidate);
        };

        let tunnel = new.with_id(id.clone());
        info!("[{}] Tunnel added ({})", tunnel.name, id);
        registry.tunnels.insert(id.clone(), tunnel.clone());

        if tunnel.enabled {
            self.start_locked(&mut registry, &id).await;
        }

        Ok(tunnel)
    }

    /// Replace the definition of an existing tunnel and reconcile its
    /// process with the new desired state.
    ///
    /// An active tunnel whose definition changed is restarted so the running
    /// process matches what is stored.
    pub async fn update(&self, tunnel: Tunnel) -> Result<()> {
        tunnel.validate()?;

        let id = tunnel.id.clone();
        let _op = self.lock_id(&id).await;
        let mut registry = self.registry.lock().await;
        let Some(current) = registry.tunnels.get(&id).cloned() else {
            registry.prune_guard(&id);
            return Err(SupervisorError::NotFound(id));
        };

        let active = registry.procs.contains_key(&id);
        let changed = current != tunnel;
        let enabled = tunnel.enabled;
        info!("[{}] Tunnel updated ({})", tunnel.name, id);
        registry.tunnels.insert(id.clone(), tunnel);

        if active && (!enabled || changed) {
            let record = Self::detach(&mut registry, &id);
            drop(registry);
            self.teardown(record).await;

            if enabled {
                let mut registry = self.registry.lock().await;
                self.start_locked(&mut registry, &id).await;
            }
        } else if !active && enabled {
            self.start_locked(&mut registry, &id).await;
        }

        Ok(())
    }

    /// Stop and remove a tunnel, returning its last definition.
    pub async fn delete(&self, id: &str) -> Result<Tunnel> {
        let _op = self.lock_id(id).await;
        let (tunnel, record) = {
            let mut registry = self.registry.lock().await;
            let Some(tunnel) = registry.tunnels.remove(id) else {
                registry.prune_guard(id);
                return Err(SupervisorError::NotFound(id.to_string()));
            };
            let record = Self::detach(&mut registry, id);
            registry.prune_guard(id);
            (tunnel, record)
        };

        self.teardown(record).await;
        info!("[{}] Tunnel deleted ({})", tunnel.name, id);

        Ok(tunnel)
    }

    /// Definitions joined with the status of their live record, ordered by
    /// name.
    pub async fn status(&self) -> Vec<TunnelStatusEntry> {
        let registry = self.registry.lock().await;
        let mut entries: Vec<TunnelStatusEntry> = registry
            .tunnels
            .values()
            .map(|tunnel| TunnelStatusEntry {
                tunnel: tunnel.clone(),
                status: registry.procs.get(&tunnel.id).map(|p| p.status()),
            })
            .collect();

        entries.sort_by(|a, b| {
            a.tunnel
                .name
                .cmp(&b.tunnel.name)
                .then_with(|| a.tunnel.id.cmp(&b.tunnel.id))
        });
        entries
    }

    /// Snapshot of all definitions, ordered by name.
    pub async fn tunnels(&self) -> Vec<Tunnel> {
        self.status().await.into_iter().map(|e| e.tunnel).collect()
    }

    pub async fn get(&self, id: &str) -> Option<Tunnel> {
        self.registry.lock().await.tunnels.get(id).cloned()
    }

    /// Live record of an active tunnel
    pub async fn record(&self, id: &str) -> Option<Arc<ProcessRecord>> {
        self.registry.lock().await.procs.get(id).cloned()
    }

    pub async fn active_count(&self) -> usize {
        self.registry.lock().await.procs.len()
    }

    /// Stop every active tunnel concurrently. Definitions are kept.
    pub async fn shutdown(&self) {
        let active: Vec<String> = self.registry.lock().await.procs.keys().cloned().collect();
        info!("Stopping {} active tunnel(s)", active.len());

        let mut teardowns = JoinSet::new();
        for id in active {
            let op = self.lock_id(&id).await;
            let Some(record) = Self::detach(&mut *self.registry.lock().await, &id) else {
                continue;
            };

            let stop_timeout = self.stop_timeout;
            teardowns.spawn(async move {
                let _op = op;
                info!("[{}] Stopping tunnel", record.tunnel().name);
                record.shutdown(stop_timeout).await;
            });
        }

        while let Some(result) = teardowns.join_next().await {
            if let Err(e) = result {
                warn!("Tunnel teardown failed: {}", e);
            }
        }
    }

    /// Serialize operations on one tunnel id.
    async fn lock_id(&self, id: &str) -> OwnedMutexGuard<()> {
        let guard = self.registry.lock().await.guard(id);
        guard.lock_owned().await
    }

    async fn start_locked(&self, registry: &mut Registry, id: &str) {
        let Some(tunnel) = registry.tunnels.get(id).cloned() else {
            debug!("Ignoring start for unknown tunnel '{}'", id);
            return;
        };

        if registry.procs.contains_key(id) {
            warn!("[{}] Tunnel is already running", tunnel.name);
            return;
        }

        info!("[{}] Starting tunnel", tunnel.name);
        let record = ProcessRecord::new(tunnel.clone());
        record.launch(&self.launcher).await;

        if tunnel.autoreboot {
            if let Some(task) =
                spawn_auto_reboot(record.clone(), self.launcher.clone(), self.reboot_backoff)
            {
                record.set_reboot_task(task);
            }
        }

        registry.procs.insert(id.to_string(), record);
    }

    /// Take the live record out of the registry. The caller tears it down
    /// after releasing the registry lock.
    fn detach(registry: &mut Registry, id: &str) -> Option<Arc<ProcessRecord>> {
        let record = registry.procs.remove(id);
        if record.is_none() {
            debug!("Ignoring stop for inactive tunnel '{}'", id);
        }
        record
    }

    async fn teardown(&self, record: Option<Arc<ProcessRecord>>) {
        if let Some(record) = record {
            info!("[{}] Stopping tunnel", record.tunnel().name);
            record.shutdown(self.stop_timeout).await;
        }
    }
}
