//! Server loop: accept, dispatch, and the per-token request handlers.
//!
//! Each accepted connection serves exactly one request and is closed when
//! the exchange completes. The handler reads the fixed-width tag, replies
//! `Ok`, runs the token's algorithm, and drops the socket. Unknown tags
//! and protocol errors close the connection without touching state.

use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;

use meshsync_proto::framing;
use meshsync_proto::{FileMeta, Peer, RequestToken, SyncFile};
use meshsync_state::NodeState;
use meshsync_store::{Area, FileStore};

use crate::client::NodeClient;
use crate::error::Result;
use crate::{fanout, merge};

/// Server half of the node: owns no socket state, only the shared
/// collections and the client used for fan-out during `AddMe` and
/// `SubscribeFile`.
pub struct Server {
    state: NodeState,
    store: FileStore,
    client: NodeClient,
}

impl Server {
    /// Build a server over the node's shared state.
    pub fn new(state: NodeState, store: FileStore, client: NodeClient) -> Self {
        Server {
            state,
            store,
            client,
        }
    }

    /// Bind the listening socket. Failure here is fatal to the node.
    pub async fn bind(host: &str, port: u16, backlog: u32) -> Result<TcpListener> {
        let mut addrs = tokio::net::lookup_host((host, port)).await?;
        let addr = addrs.next().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("{host}:{port} did not resolve"),
            )
        })?;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(backlog)?;
        tracing::info!(addr = %listener.local_addr()?, "listening");
        Ok(listener)
    }

    /// Accept connections until the shutdown flag flips, spawning one
    /// handler task per connection.
    pub async fn run(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("server loop stopping");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, remote)) => {
                            let server = Arc::clone(&self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream).await {
                                    tracing::debug!(remote = %remote, error = %e, "connection aborted");
                                }
                            });
                        }
                        Err(e) => tracing::warn!(error = %e, "accept failed"),
                    }
                }
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<()> {
        let token = match framing::read_request(&mut stream).await {
            Ok(token) => token,
            Err(e) => {
                // Unknown or malformed tag: close silently.
                tracing::debug!(error = %e, "request tag rejected");
                return Ok(());
            }
        };
        tracing::debug!(token = token.wire_name(), "dispatch");
        framing::send_ok(&mut stream).await?;

        match token {
            RequestToken::AddMe => self.handle_add_me(&mut stream).await,
            RequestToken::UserJoined => self.handle_user_joined(&mut stream).await,
            RequestToken::RequestPeerList => self.handle_request_peer_list(&mut stream).await,
            RequestToken::SendFiles => self.handle_send_files(&mut stream).await,
            RequestToken::RequestFiles => self.handle_request_files(&mut stream).await,
            RequestToken::SendSyncFiles => self.handle_send_sync_files(&mut stream).await,
            RequestToken::RequestSyncFiles => self.handle_request_sync_files(&mut stream).await,
            RequestToken::DownloadFile => self.handle_download_file(&mut stream).await,
            RequestToken::SubscribeFile => self.handle_subscribe_file(&mut stream).await,
            RequestToken::UserSubscribed => self.handle_user_subscribed(&mut stream).await,
            RequestToken::SyncFileUpdate => self.handle_sync_file_update(&mut stream).await,
        }
    }

    /// A joining peer registered with us: broadcast it to everyone we
    /// already know, then admit it to the roster.
    async fn handle_add_me(&self, stream: &mut TcpStream) -> Result<()> {
        let new_peer: Peer = framing::read_payload(stream).await?;
        if new_peer == *self.state.self_peer() || self.state.roster().contains(&new_peer).await {
            return Ok(());
        }
        let snapshot = self.state.roster().snapshot().await;
        let summary = fanout::notify_user_joined(&self.client, &snapshot, &new_peer).await;
        if !summary.all_succeeded() {
            tracing::warn!(
                peer = %new_peer,
                failed = summary.failed,
                "membership broadcast partially failed"
            );
        }
        self.state.roster().insert(new_peer).await;
        Ok(())
    }

    async fn handle_user_joined(&self, stream: &mut TcpStream) -> Result<()> {
        let peer: Peer = framing::read_payload(stream).await?;
        self.state.roster().insert(peer).await;
        Ok(())
    }

    async fn handle_request_peer_list(&self, stream: &mut TcpStream) -> Result<()> {
        let mut peers = self.state.roster().snapshot().await;
        peers.push(self.state.self_peer().clone());
        framing::send_payload(stream, &peers).await
            .map_err(Into::into)
    }

    async fn handle_send_files(&self, stream: &mut TcpStream) -> Result<()> {
        let files: Vec<FileMeta> = framing::read_payload(stream).await?;
        merge::merge_files(&self.state, &self.store, files).await;
        Ok(())
    }

    async fn handle_request_files(&self, stream: &mut TcpStream) -> Result<()> {
        let files = self.state.exported_catalog().await;
        framing::send_payload(stream, &files).await.map_err(Into::into)
    }

    async fn handle_send_sync_files(&self, stream: &mut TcpStream) -> Result<()> {
        let sync_files: Vec<SyncFile> = framing::read_payload(stream).await?;
        merge::merge_sync_files(&self.state, &self.store, sync_files).await;
        Ok(())
    }

    async fn handle_request_sync_files(&self, stream: &mut TcpStream) -> Result<()> {
        let sync_files = self.state.subscriptions().snapshot().await;
        framing::send_payload(stream, &sync_files).await.map_err(Into::into)
    }

    async fn handle_download_file(&self, stream: &mut TcpStream) -> Result<()> {
        let file: FileMeta = framing::read_payload(stream).await?;
        framing::send_ok(stream).await?;
        self.send_area_body(stream, Area::Share, &file.filename).await
    }

    /// Serve a sync file to a new subscriber, record the subscription,
    /// and tell the other subscribers about it.
    async fn handle_subscribe_file(&self, stream: &mut TcpStream) -> Result<()> {
        let new_subscriber: Peer = framing::read_payload(stream).await?;
        framing::send_ok(stream).await?;
        let requested: SyncFile = framing::read_payload(stream).await?;
        framing::send_ok(stream).await?;

        let me = self.state.self_peer().clone();
        let serves = match self.state.subscriptions().get(&requested.filename).await {
            Some(entry) => entry.is_subscriber(&me),
            None => false,
        };
        if !serves {
            tracing::warn!(filename = %requested.filename, "subscribe request for a file not held here");
            framing::send_len_prefix(stream, 0).await?;
            return Ok(());
        }

        self.send_area_body(stream, Area::Sync, &requested.filename).await?;
        self.state
            .subscriptions()
            .add_subscriber(&requested.filename, new_subscriber.clone())
            .await;

        if let Some(entry) = self.state.subscriptions().get(&requested.filename).await {
            let recipients: Vec<Peer> = entry
                .users_subbed
                .iter()
                .filter(|p| **p != me && **p != new_subscriber)
                .cloned()
                .collect();
            fanout::notify_user_subscribed(&self.client, &recipients, &new_subscriber, &entry)
                .await;
        }
        Ok(())
    }

    async fn handle_user_subscribed(&self, stream: &mut TcpStream) -> Result<()> {
        let subscriber: Peer = framing::read_payload(stream).await?;
        framing::send_ok(stream).await?;
        let sync_file: SyncFile = framing::read_payload(stream).await?;
        self.state
            .subscriptions()
            .add_subscriber(&sync_file.filename, subscriber)
            .await;
        Ok(())
    }

    /// Accept updated content for a tracked sync file. Updates for
    /// filenames we do not track are rejected: the descriptor is
    /// acknowledged, nothing is written, and the connection closes
    /// without accepting a body.
    async fn handle_sync_file_update(&self, stream: &mut TcpStream) -> Result<()> {
        let descriptor: SyncFile = framing::read_payload(stream).await?;
        if !self
            .state
            .subscriptions()
            .contains_filename(&descriptor.filename)
            .await
        {
            tracing::warn!(filename = %descriptor.filename, "update for untracked sync file rejected");
            framing::send_ok(stream).await?;
            return Ok(());
        }
        framing::send_ok(stream).await?;
        let mut out = self
            .store
            .open_write(Area::Sync, &descriptor.filename)
            .await?;
        let received = framing::recv_body(stream, &mut out).await?;
        framing::send_ok(stream).await?;
        tracing::info!(filename = %descriptor.filename, bytes = received, "sync file updated");
        Ok(())
    }

    /// Stream a named file as a length-prefixed body, or a zero-length
    /// body when it does not exist.
    async fn send_area_body(
        &self,
        stream: &mut TcpStream,
        area: Area,
        name: &str,
    ) -> Result<()> {
        match self.store.size(area, name).await {
            Ok(len) => {
                let mut src = self.store.open_read(area, name).await?;
                framing::send_body(stream, &mut src, len).await?;
            }
            Err(_) => {
                tracing::warn!(filename = %name, "requested file missing, sending empty body");
                framing::send_len_prefix(stream, 0).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshsync_proto::PeerAddr;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct TestNode {
        _dir: tempfile::TempDir,
        state: NodeState,
        store: FileStore,
        client: NodeClient,
        addr: PeerAddr,
        shutdown: watch::Sender<bool>,
    }

    async fn start_node(username: &str) -> TestNode {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let listener = Server::bind("127.0.0.1", 0, 10).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let addr = PeerAddr::new("127.0.0.1", port);
        let self_peer = Peer::new(addr.clone(), username);
        let state = NodeState::new(self_peer.clone(), vec![]);
        let client = NodeClient::new(
            self_peer,
            store.clone(),
            Duration::from_secs(2),
            Duration::from_secs(5),
        );
        let server = Arc::new(Server::new(state.clone(), store.clone(), client.clone()));
        let (tx, rx) = watch::channel(false);
        tokio::spawn(server.run(listener, rx));
        TestNode {
            _dir: dir,
            state,
            store,
            client,
            addr,
            shutdown: tx,
        }
    }

    #[tokio::test]
    async fn test_add_me_then_peer_list_includes_self() {
        let a = start_node("A").await;
        let b = start_node("B").await;

        b.client.add_me(&a.addr).await.unwrap();
        // AddMe runs in a spawned handler; give it a beat.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(a.state.roster().contains(b.client.self_peer()).await);

        let peers = b.client.request_peer_list(&a.addr).await.unwrap();
        assert!(peers.contains(a.state.self_peer()));
        assert!(peers.contains(b.client.self_peer()));

        a.shutdown.send(true).unwrap();
        b.shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_add_me_is_idempotent() {
        let a = start_node("A").await;
        let b = start_node("B").await;

        b.client.add_me(&a.addr).await.unwrap();
        b.client.add_me(&a.addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(a.state.roster().len().await, 1);

        a.shutdown.send(true).unwrap();
        b.shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_send_files_respects_local_files() {
        let a = start_node("A").await;
        let b = start_node("B").await;

        let mut f = a.store.open_write(Area::Share, "have.txt").await.unwrap();
        f.write_all(b"mine").await.unwrap();
        drop(f);

        let owner = b.client.self_peer().clone();
        b.client
            .send_files(
                &a.addr,
                &[FileMeta::new("new.txt", &owner), FileMeta::new("have.txt", &owner)],
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(a.state.catalog().contains_filename("new.txt").await);
        assert!(!a.state.catalog().contains_filename("have.txt").await);

        a.shutdown.send(true).unwrap();
        b.shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_download_missing_file_yields_empty_body() {
        let a = start_node("A").await;
        let b = start_node("B").await;

        let ghost = FileMeta {
            filename: "ghost.txt".to_string(),
            username: "A".to_string(),
            addr: a.addr.clone(),
        };
        let received = b.client.download_file(&ghost).await.unwrap();
        assert_eq!(received, 0);

        a.shutdown.send(true).unwrap();
        b.shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_unknown_tag_closes_silently() {
        let a = start_node("A").await;

        let mut stream =
            TcpStream::connect(("127.0.0.1", a.addr.port())).await.unwrap();
        let mut tag = [0u8; 20];
        tag[..6].copy_from_slice(b"BogusX");
        stream.write_all(&tag).await.unwrap();
        // No Ok comes back; the server closes without a byte.
        let mut buf = [0u8; 2];
        let got = stream.read(&mut buf).await.unwrap();
        assert_eq!(got, 0);

        a.shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_sync_update_for_untracked_file_rejected() {
        let a = start_node("A").await;

        let mut stream =
            TcpStream::connect(("127.0.0.1", a.addr.port())).await.unwrap();
        framing::send_request(&mut stream, RequestToken::SyncFileUpdate)
            .await
            .unwrap();
        framing::expect_ok(&mut stream).await.unwrap();

        let sender = Peer::new(PeerAddr::new("127.0.0.1", 1), "B");
        let rogue = SyncFile::new("rogue.md", vec![sender]);
        framing::send_payload(&mut stream, &rogue).await.unwrap();
        // The descriptor is acknowledged even though the update is refused...
        framing::expect_ok(&mut stream).await.unwrap();

        // ...but the connection closes without accepting a body.
        let body = b"evil";
        let mut src = std::io::Cursor::new(body.to_vec());
        let _ = framing::send_body(&mut stream, &mut src, body.len() as u64).await;
        assert!(framing::expect_ok(&mut stream).await.is_err());
        assert!(!a.store.contains(Area::Sync, "rogue.md").await);

        a.shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_user_subscribed_dedupes() {
        let a = start_node("A").await;
        let b = start_node("B").await;

        let me = a.state.self_peer().clone();
        a.state
            .subscriptions()
            .insert_if_new(SyncFile::new("notes.md", vec![me]))
            .await;

        let sub = b.client.self_peer().clone();
        let descriptor = SyncFile::new("notes.md", vec![a.state.self_peer().clone()]);
        b.client
            .user_subscribed(&a.addr, &sub, &descriptor)
            .await
            .unwrap();
        b.client
            .user_subscribed(&a.addr, &sub, &descriptor)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let entry = a.state.subscriptions().get("notes.md").await.unwrap();
        assert_eq!(entry.users_subbed.len(), 2);

        a.shutdown.send(true).unwrap();
        b.shutdown.send(true).unwrap();
    }
}
