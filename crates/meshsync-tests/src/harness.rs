//! Multi-node loopback mesh harness.
//!
//! Each node gets its own temporary data directory and an ephemeral
//! loopback port; the roster carries whatever port the listener actually
//! bound, so meshes of any size can coexist in one test process.

use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

use meshsync_node::{Node, NodeConfig};
use meshsync_proto::Peer;

/// A running node plus the temp directory backing its data root.
pub struct MeshNode {
    dir: TempDir,
    node: Node,
}

impl MeshNode {
    /// Start a node with empty data directories.
    pub async fn start(username: &str, bootstrap: Option<&MeshNode>) -> MeshNode {
        MeshNode::start_with(username, bootstrap, &[], &[]).await
    }

    /// Start a node with the given files pre-seeded on disk.
    pub async fn start_with(
        username: &str,
        bootstrap: Option<&MeshNode>,
        files: &[(&str, &[u8])],
        sync_files: &[(&str, &[u8])],
    ) -> MeshNode {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        seed_dir(dir.path(), "Files", files);
        seed_dir(dir.path(), "SyncFiles", sync_files);

        let config = NodeConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            username: username.to_string(),
            bootstrap: bootstrap.map(|n| n.addr()),
            data_dir: dir.path().to_path_buf(),
            connect_timeout_secs: 2,
            exchange_timeout_secs: 5,
            backlog: 10,
            watcher_poll_ms: 50,
        };
        let node = Node::start(config).await.expect("node failed to start");
        MeshNode { dir, node }
    }

    /// The running node.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// The node's bound address as `host:port`.
    pub fn addr(&self) -> String {
        format!("127.0.0.1:{}", self.node.local_addr().port())
    }

    /// The node's own peer record.
    pub fn peer(&self) -> Peer {
        self.node.self_peer().clone()
    }

    /// Path of a file in the node's `Files/` directory.
    pub fn file_path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join("Files").join(name)
    }

    /// Path of a file in the node's `SyncFiles/` directory.
    pub fn sync_file_path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join("SyncFiles").join(name)
    }

    /// Overwrite a file in `SyncFiles/`, as an editor save would.
    pub fn edit_sync_file(&self, name: &str, content: &[u8]) {
        std::fs::write(self.sync_file_path(name), content).expect("failed to edit sync file");
    }

    /// Stop the node and wait for its tasks.
    pub async fn stop(self) {
        self.node.shutdown().await;
    }
}

fn seed_dir(root: &Path, dir: &str, files: &[(&str, &[u8])]) {
    let dir = root.join(dir);
    std::fs::create_dir_all(&dir).expect("failed to create data dir");
    for (name, content) in files {
        std::fs::write(dir.join(name), content).expect("failed to seed file");
    }
}

/// Poll `check` every 25 ms until it returns true or `timeout` elapses.
///
/// Returns whether the condition was met.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
