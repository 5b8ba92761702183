use sshfwd_store::{StoreError, TunnelStore};
use sshfwd_supervisor::Tunnel;
use std::fs;
use tempfile::TempDir;

fn edge_tunnel(id: &str, local_port: u16, remote_port: u16) -> Tunnel {
    Tunnel {
        id: id.to_string(),
        name: String::new(),
        enabled: false,
        local_port,
        host: String::new(),
        remote_port,
        conn_addr: String::new(),
        autoreboot: false,
    }
}

#[test]
fn test_round_trip_preserves_edge_values() {
    let temp = TempDir::new().unwrap();
    let store = TunnelStore::new(temp.path().join(".tunnels.json"));

    let tunnels = vec![
        edge_tunnel("low", 0, 0),
        edge_tunnel("high", 65535, 65535),
        Tunnel {
            id: "unicode".to_string(),
            name: "données ☃".to_string(),
            enabled: true,
            local_port: 1,
            host: "10.0.0.1".to_string(),
            remote_port: 22,
            conn_addr: "root@[::1]".to_string(),
            autoreboot: true,
        },
    ];

    store.save(&tunnels).unwrap();
    assert_eq!(store.load().unwrap(), tunnels);
}

#[test]
fn test_save_overwrites_previous_contents() {
    let temp = TempDir::new().unwrap();
    let store = TunnelStore::new(temp.path().join(".tunnels.json"));

    store
        .save(&[edge_tunnel("a", 1, 2), edge_tunnel("b", 3, 4)])
        .unwrap();
    store.save(&[edge_tunnel("c", 5, 6)]).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, "c");
}

#[test]
fn test_loads_file_written_by_hand() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(".tunnels.json");
    fs::write(
        &path,
        r#"{
            "tunnels": [
                {
                    "autoreboot": true,
                    "conn_addr": "me@bastion",
                    "enabled": true,
                    "host": "db",
                    "id": "Abc123",
                    "local_port": 5432,
                    "name": "postgres",
                    "remote_port": 5432
                }
            ]
        }"#,
    )
    .unwrap();

    let tunnels = TunnelStore::new(&path).load().unwrap();
    assert_eq!(tunnels.len(), 1);
    assert_eq!(tunnels[0].forward_spec(), "5432:db:5432");
}

#[test]
fn test_out_of_range_port_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(".tunnels.json");
    fs::write(
        &path,
        r#"{"tunnels":[{"id":"x","name":"x","enabled":true,"local_port":70000,"host":"h","remote_port":1,"conn_addr":"c","autoreboot":false}]}"#,
    )
    .unwrap();

    let err = TunnelStore::new(&path).load().unwrap_err();
    assert!(matches!(err, StoreError::Parse { .. }));
}
