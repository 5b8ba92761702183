#![cfg(unix)]

use sshfwd_cli::config::DaemonConfig;
use sshfwd_cli::daemon::{spawn_autosaver, Daemon};
use sshfwd_store::TunnelStore;
use sshfwd_supervisor::{NewTunnel, SshCommand, Supervisor, SupervisorConfig, Tunnel};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

fn test_config(temp: &TempDir) -> DaemonConfig {
    DaemonConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        tunnels_file: temp.path().join(".tunnels.json"),
        ssh_path: Some(PathBuf::from("/bin/sh")),
        autosave_interval_secs: 0,
        ..Default::default()
    }
}

fn disabled_tunnel(id: &str) -> Tunnel {
    Tunnel {
        id: id.to_string(),
        name: format!("tunnel-{}", id),
        enabled: false,
        local_port: 2000,
        host: "localhost".to_string(),
        remote_port: 22,
        conn_addr: "me@gateway".to_string(),
        autoreboot: true,
    }
}

#[tokio::test]
async fn test_daemon_saves_definitions_on_shutdown() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let store = TunnelStore::new(&config.tunnels_file);
    let tunnels = vec![disabled_tunnel("a"), disabled_tunnel("b")];
    store.save(&tunnels).unwrap();

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let daemon = tokio::spawn(Daemon::new(config).run(async move {
        shutdown_rx.await.ok();
    }));

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown_tx.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(5), daemon)
        .await
        .expect("daemon did not shut down")
        .unwrap()
        .unwrap();

    assert_eq!(store.load().unwrap(), tunnels);
}

#[tokio::test]
async fn test_daemon_starts_without_tunnels_file() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let path = config.tunnels_file.clone();

    Daemon::new(config).run(async {}).await.unwrap();

    assert_eq!(fs::read_to_string(path).unwrap(), r#"{"tunnels":[]}"#);
}

#[tokio::test]
async fn test_daemon_refuses_unreadable_tunnels_file() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    fs::write(&config.tunnels_file, "{broken").unwrap();

    let result = Daemon::new(config.clone()).run(async {}).await;

    assert!(result.is_err());
    assert_eq!(fs::read_to_string(&config.tunnels_file).unwrap(), "{broken");
}

#[tokio::test]
async fn test_autosaver_persists_changes() {
    let temp = TempDir::new().unwrap();
    let store = TunnelStore::new(temp.path().join(".tunnels.json"));
    let supervisor = Arc::new(Supervisor::new(
        SupervisorConfig::new(SshCommand::new("/bin/sh")),
        vec![],
    ));

    let cancel = CancellationToken::new();
    let autosaver = spawn_autosaver(
        supervisor.clone(),
        store.clone(),
        Duration::from_millis(50),
        cancel.clone(),
    );

    let tunnel = supervisor
        .create(NewTunnel {
            name: "db".to_string(),
            enabled: false,
            local_port: 5432,
            host: "db".to_string(),
            remote_port: 5432,
            conn_addr: "me@gateway".to_string(),
            autoreboot: false,
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(store.load().unwrap(), vec![tunnel]);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), autosaver)
        .await
        .expect("autosaver did not stop")
        .unwrap();
}
