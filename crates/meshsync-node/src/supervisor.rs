//! Supervisor: constructs the node, runs its tasks, owns shutdown.
//!
//! Startup order follows the protocol: bind the listener first (fatal on
//! failure), seed state from the data directories, start the server
//! loop, run the one-shot initial join to completion, then start the
//! sync watcher. Shutdown flips a watch flag that every long-running
//! loop polls between iterations.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use meshsync_proto::{FileMeta, Peer, PeerAddr, SyncFile};
use meshsync_state::NodeState;
use meshsync_store::{Area, FileStore};

use crate::client::NodeClient;
use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::join;
use crate::server::Server;
use crate::watcher::{SaveTrigger, SyncWatcher};

/// A running meshsync node.
pub struct Node {
    state: NodeState,
    store: FileStore,
    client: NodeClient,
    save: SaveTrigger,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Bring a node up: bind, seed, serve, join, watch.
    pub async fn start(config: NodeConfig) -> Result<Node> {
        let store = FileStore::open(&config.data_dir).await?;

        let listener = Server::bind(&config.host, config.port, config.backlog).await?;
        let local_addr = listener.local_addr()?;
        let self_peer = Peer::new(
            PeerAddr::new(config.host.clone(), local_addr.port()),
            config.username.clone(),
        );

        let initial_files: Vec<FileMeta> = store
            .list(Area::Share)
            .await?
            .into_iter()
            .map(|name| FileMeta::new(name, &self_peer))
            .collect();
        let state = NodeState::new(self_peer.clone(), initial_files);

        // Documents already on disk are subscriptions with self as the
        // sole subscriber.
        for name in store.list(Area::Sync).await? {
            state
                .subscriptions()
                .insert_if_new(SyncFile::new(name, vec![self_peer.clone()]))
                .await;
        }

        let client = NodeClient::new(
            self_peer.clone(),
            store.clone(),
            config.connect_timeout(),
            config.exchange_timeout(),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        let server = Arc::new(Server::new(state.clone(), store.clone(), client.clone()));
        tasks.push(tokio::spawn(server.run(listener, shutdown_rx.clone())));

        if let Some(bootstrap) = &config.bootstrap {
            let target = parse_host_port(bootstrap)?;
            join::initial_join(&client, &state, &store, &target).await;
        }

        let watcher = SyncWatcher::new(
            state.clone(),
            store.clone(),
            client.clone(),
            config.watcher_poll(),
        );
        let save = watcher.trigger();
        tasks.push(tokio::spawn(watcher.run(shutdown_rx)));

        tracing::info!(peer = %self_peer, "node started");
        Ok(Node {
            state,
            store,
            client,
            save,
            local_addr,
            shutdown_tx,
            tasks,
        })
    }

    /// The node's shared collections.
    pub fn state(&self) -> &NodeState {
        &self.state
    }

    /// The node's data directories.
    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// The node's outbound client.
    pub fn client(&self) -> &NodeClient {
        &self.client
    }

    /// The node's own peer record.
    pub fn self_peer(&self) -> &Peer {
        self.state.self_peer()
    }

    /// The address the listener actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Arm the sync watcher's save flag, as the external driver does
    /// after the user edits a subscribed document.
    pub fn trigger_save(&self) {
        self.save.arm();
    }

    /// A clone-able handle for arming the save flag from other tasks.
    pub fn save_trigger(&self) -> SaveTrigger {
        self.save.clone()
    }

    /// Download a catalog entry by filename into `Files/`.
    pub async fn download(&self, filename: &str) -> Result<u64> {
        let files = self.state.catalog().snapshot().await;
        let Some(file) = files.iter().find(|f| f.filename == filename) else {
            return Err(NodeError::UnknownFile {
                filename: filename.to_string(),
            });
        };
        self.client.download_file(file).await
    }

    /// Subscribe to a tracked sync file by filename: fetch its content
    /// from the canonical source and record self as a subscriber.
    pub async fn subscribe(&self, filename: &str) -> Result<u64> {
        let Some(entry) = self.state.subscriptions().get(filename).await else {
            return Err(NodeError::UnknownSyncFile {
                filename: filename.to_string(),
            });
        };
        let Some(source) = entry.source().cloned() else {
            return Err(NodeError::UnknownSyncFile {
                filename: filename.to_string(),
            });
        };
        let received = self.client.subscribe_file(&source.addr, &entry).await?;
        self.state
            .subscriptions()
            .add_subscriber(filename, self.self_peer().clone())
            .await;
        Ok(received)
    }

    /// Stop the long-running tasks and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        tracing::info!("node stopped");
    }
}

fn parse_host_port(s: &str) -> Result<PeerAddr> {
    let (host, port) = s.rsplit_once(':').ok_or_else(|| {
        NodeError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("bootstrap address {s:?} is not host:port"),
        ))
    })?;
    let port: u16 = port.parse().map_err(|_| {
        NodeError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("bootstrap port in {s:?} is not a number"),
        ))
    })?;
    Ok(PeerAddr::new(host, port))
}
