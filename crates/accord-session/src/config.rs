use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Address the coordinator listens on.
    pub bind_addr: SocketAddr,
    /// The authoritative working tree.
    pub tree_root: PathBuf,
    /// Root of the snapshot backup store.
    pub backup_root: PathBuf,
    /// Conflict/merge cache file. `None` keeps the cache in memory.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    /// Poll loop timeout in milliseconds.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    /// Bound on a whole snapshot fetch, in seconds.
    #[serde(default = "default_snapshot_fetch_timeout_secs")]
    pub snapshot_fetch_timeout_secs: u64,
}

fn default_poll_timeout_ms() -> u64 {
    200
}

fn default_snapshot_fetch_timeout_secs() -> u64 {
    30
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7350".parse().expect("static address"),
            tree_root: PathBuf::from("."),
            backup_root: PathBuf::from(".accord/backups"),
            cache_path: Some(PathBuf::from(".accord/conflict-cache.json")),
            poll_timeout_ms: default_poll_timeout_ms(),
            snapshot_fetch_timeout_secs: default_snapshot_fetch_timeout_secs(),
        }
    }
}

impl CoordinatorConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn snapshot_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.snapshot_fetch_timeout_secs)
    }

    /// Load from a TOML file.
    pub fn from_toml_file(path: &Path) -> SessionResult<Self> {
        let data = std::fs::read_to_string(path)?;
        toml::from_str(&data).map_err(|e| SessionError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = CoordinatorConfig::default();
        assert_eq!(c.poll_timeout(), Duration::from_millis(200));
        assert_eq!(c.snapshot_fetch_timeout(), Duration::from_secs(30));
        assert!(c.cache_path.is_some());
    }

    #[test]
    fn toml_roundtrip() {
        let config = CoordinatorConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: CoordinatorConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.bind_addr, config.bind_addr);
        assert_eq!(parsed.poll_timeout_ms, config.poll_timeout_ms);
    }

    #[test]
    fn toml_defaults_fill_in() {
        let parsed: CoordinatorConfig = toml::from_str(
            "bind_addr = \"127.0.0.1:9000\"\ntree_root = \"/srv/tree\"\nbackup_root = \"/srv/backups\"\n",
        )
        .unwrap();
        assert_eq!(parsed.poll_timeout_ms, 200);
        assert_eq!(parsed.snapshot_fetch_timeout_secs, 30);
        assert!(parsed.cache_path.is_none());
    }

    #[test]
    fn from_toml_file_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accord.toml");
        std::fs::write(
            &path,
            "bind_addr = \"127.0.0.1:9001\"\ntree_root = \".\"\nbackup_root = \"b\"\n",
        )
        .unwrap();
        let config = CoordinatorConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9001".parse().unwrap());
    }
}
