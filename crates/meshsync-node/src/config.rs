//! Node configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything a node needs to come up: identity, bootstrap target, data
/// root, and the protocol timing knobs shared with the rest of the mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Host the node binds and advertises to peers.
    pub host: String,
    /// Port to bind. Zero picks an ephemeral port; the advertised
    /// self-peer carries the port actually bound.
    pub port: u16,
    /// Username advertised to peers.
    pub username: String,
    /// Bootstrap peer as `host:port`. None for the first node of a mesh.
    pub bootstrap: Option<String>,
    /// Directory containing `Files/` and `SyncFiles/`.
    pub data_dir: PathBuf,
    /// Outbound connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Deadline for one full request exchange in seconds.
    pub exchange_timeout_secs: u64,
    /// Listen backlog.
    pub backlog: u32,
    /// Sync watcher poll interval in milliseconds.
    pub watcher_poll_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 0,
            username: String::from("anonymous"),
            bootstrap: None,
            data_dir: PathBuf::from("."),
            connect_timeout_secs: 15,
            exchange_timeout_secs: 120,
            backlog: 10,
            watcher_poll_ms: 500,
        }
    }
}

impl NodeConfig {
    /// Load a config from a TOML or JSON file, by extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let config: NodeConfig = toml::from_str(&contents)?;
                Ok(config)
            }
            "json" => {
                let config: NodeConfig = serde_json::from_str(&contents)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }

    /// Outbound connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Full-exchange deadline.
    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout_secs)
    }

    /// Watcher poll interval.
    pub fn watcher_poll(&self) -> Duration {
        Duration::from_millis(self.watcher_poll_ms)
    }
}
