//! Tunnel definition storage
//!
//! Persists tunnel definitions as a single JSON document,
//! `{"tunnels":[...]}`, by default `.tunnels.json` in the working directory.

use serde::{Deserialize, Serialize};
use sshfwd_supervisor::Tunnel;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Default tunnels file, relative to the working directory
pub const DEFAULT_TUNNELS_FILE: &str = ".tunnels.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read tunnels file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write tunnels file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse tunnels file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize tunnels: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Deserialize)]
struct TunnelFile {
    #[serde(default)]
    tunnels: Vec<Tunnel>,
}

#[derive(Serialize)]
struct TunnelFileRef<'a> {
    tunnels: &'a [Tunnel],
}

/// JSON file holding every tunnel definition
#[derive(Debug, Clone)]
pub struct TunnelStore {
    path: PathBuf,
}

impl TunnelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all definitions. A missing file is an empty set.
    pub fn load(&self) -> Result<Vec<Tunnel>> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No tunnels file at {:?}, starting empty", self.path);
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let file: TunnelFile = serde_json::from_str(&json).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;

        debug!("Loaded {} tunnel(s) from {:?}", file.tunnels.len(), self.path);
        Ok(file.tunnels)
    }

    /// Replace the file contents with `tunnels`.
    ///
    /// Writes to a sibling temporary file first and renames it over the
    /// target, so a crash mid-write never leaves a truncated document.
    pub fn save(&self, tunnels: &[Tunnel]) -> Result<()> {
        let json = serde_json::to_string(&TunnelFileRef { tunnels })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp = self.tmp_path();
        fs::write(&tmp, json).map_err(|source| StoreError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;

        debug!("Saved {} tunnel(s) to {:?}", tunnels.len(), self.path);
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Default for TunnelStore {
    fn default() -> Self {
        Self::new(DEFAULT_TUNNELS_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TunnelStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = TunnelStore::new(temp_dir.path().join("tunnels.json"));
        (store, temp_dir)
    }

    fn create_test_tunnel(id: &str) -> Tunnel {
        Tunnel {
            id: id.to_string(),
            name: format!("tunnel-{}", id),
            enabled: true,
            local_port: 8080,
            host: "localhost".to_string(),
            remote_port: 80,
            conn_addr: "user@gateway".to_string(),
            autoreboot: true,
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let (store, _temp) = create_test_store();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let (store, _temp) = create_test_store();
        let tunnels = vec![create_test_tunnel("a"), create_test_tunnel("b")];

        store.save(&tunnels).unwrap();
        assert_eq!(store.load().unwrap(), tunnels);
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn test_field_order() {
        let (store, _temp) = create_test_store();
        store.save(&[create_test_tunnel("a")]).unwrap();

        let json = fs::read_to_string(store.path()).unwrap();
        assert_eq!(
            json,
            r#"{"tunnels":[{"id":"a","name":"tunnel-a","enabled":true,"local_port":8080,"host":"localhost","remote_port":80,"conn_addr":"user@gateway","autoreboot":true}]}"#
        );
    }

    #[test]
    fn test_unparseable_file_is_error() {
        let (store, _temp) = create_test_store();
        fs::write(store.path(), "{not json").unwrap();

        assert!(matches!(store.load(), Err(StoreError::Parse { .. })));
    }

    #[test]
    fn test_save_creates_parent_dir() {
        let temp_dir = TempDir::new().unwrap();
        let store = TunnelStore::new(temp_dir.path().join("nested").join("tunnels.json"));

        store.save(&[]).unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), r#"{"tunnels":[]}"#);
    }
}
