//! Outbound client operations.
//!
//! Every operation opens a fresh TCP connection, performs exactly one
//! request exchange, and closes. Connects carry an explicit timeout and
//! the whole exchange runs under a deadline, so a stalled peer can never
//! wedge a fan-out loop or the initial join.

use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;

use meshsync_proto::framing;
use meshsync_proto::{FileMeta, Peer, PeerAddr, RequestToken, SyncFile};
use meshsync_store::{Area, FileStore};

use crate::error::{NodeError, Result};

/// Client half of the node: one method per outbound request token.
#[derive(Debug, Clone)]
pub struct NodeClient {
    self_peer: Peer,
    store: FileStore,
    connect_timeout: Duration,
    exchange_timeout: Duration,
}

impl NodeClient {
    /// Build a client for the given identity and data directories.
    pub fn new(
        self_peer: Peer,
        store: FileStore,
        connect_timeout: Duration,
        exchange_timeout: Duration,
    ) -> Self {
        NodeClient {
            self_peer,
            store,
            connect_timeout,
            exchange_timeout,
        }
    }

    /// The identity this client presents to peers.
    pub fn self_peer(&self) -> &Peer {
        &self.self_peer
    }

    async fn connect(&self, addr: &PeerAddr) -> Result<TcpStream> {
        let target = (addr.host().to_string(), addr.port());
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(target))
            .await
            .map_err(|_| NodeError::ConnectTimeout {
                addr: addr.to_string(),
                timeout_ms: self.connect_timeout.as_millis() as u64,
            })??;
        stream.set_nodelay(true)?;
        tracing::debug!(addr = %addr, "connected");
        Ok(stream)
    }

    async fn with_deadline<T, F>(&self, addr: &PeerAddr, exchange: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.exchange_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(NodeError::ExchangeTimeout {
                addr: addr.to_string(),
                timeout_ms: self.exchange_timeout.as_millis() as u64,
            }),
        }
    }

    /// `AddMe`: register self into the target's roster.
    pub async fn add_me(&self, target: &PeerAddr) -> Result<()> {
        let mut stream = self.connect(target).await?;
        self.with_deadline(target, async {
            framing::send_request(&mut stream, RequestToken::AddMe).await?;
            framing::expect_ok(&mut stream).await?;
            framing::send_payload(&mut stream, &self.self_peer).await?;
            Ok(())
        })
        .await
    }

    /// `UserJoined`: tell the target a third party joined.
    pub async fn user_joined(&self, target: &PeerAddr, new_peer: &Peer) -> Result<()> {
        let mut stream = self.connect(target).await?;
        self.with_deadline(target, async {
            framing::send_request(&mut stream, RequestToken::UserJoined).await?;
            framing::expect_ok(&mut stream).await?;
            framing::send_payload(&mut stream, new_peer).await?;
            Ok(())
        })
        .await
    }

    /// `RequestPeerList`: fetch the target's roster plus its self-peer.
    pub async fn request_peer_list(&self, target: &PeerAddr) -> Result<Vec<Peer>> {
        let mut stream = self.connect(target).await?;
        self.with_deadline(target, async {
            framing::send_request(&mut stream, RequestToken::RequestPeerList).await?;
            framing::expect_ok(&mut stream).await?;
            Ok(framing::read_payload(&mut stream).await?)
        })
        .await
    }

    /// `SendFiles`: push a file catalog to the target.
    pub async fn send_files(&self, target: &PeerAddr, files: &[FileMeta]) -> Result<()> {
        let mut stream = self.connect(target).await?;
        self.with_deadline(target, async {
            framing::send_request(&mut stream, RequestToken::SendFiles).await?;
            framing::expect_ok(&mut stream).await?;
            framing::send_payload(&mut stream, &files).await?;
            Ok(())
        })
        .await
    }

    /// `RequestFiles`: fetch the target's file catalog.
    pub async fn request_files(&self, target: &PeerAddr) -> Result<Vec<FileMeta>> {
        let mut stream = self.connect(target).await?;
        self.with_deadline(target, async {
            framing::send_request(&mut stream, RequestToken::RequestFiles).await?;
            framing::expect_ok(&mut stream).await?;
            Ok(framing::read_payload(&mut stream).await?)
        })
        .await
    }

    /// `SendSyncFiles`: push sync-file descriptors to the target.
    pub async fn send_sync_files(&self, target: &PeerAddr, files: &[SyncFile]) -> Result<()> {
        let mut stream = self.connect(target).await?;
        self.with_deadline(target, async {
            framing::send_request(&mut stream, RequestToken::SendSyncFiles).await?;
            framing::expect_ok(&mut stream).await?;
            framing::send_payload(&mut stream, &files).await?;
            Ok(())
        })
        .await
    }

    /// `RequestSyncFiles`: fetch the target's sync-file descriptors.
    pub async fn request_sync_files(&self, target: &PeerAddr) -> Result<Vec<SyncFile>> {
        let mut stream = self.connect(target).await?;
        self.with_deadline(target, async {
            framing::send_request(&mut stream, RequestToken::RequestSyncFiles).await?;
            framing::expect_ok(&mut stream).await?;
            Ok(framing::read_payload(&mut stream).await?)
        })
        .await
    }

    /// `DownloadFile`: fetch a blob from its owner into `Files/`.
    ///
    /// Returns the number of bytes received. A zero-length body is the
    /// owner's way of saying the file no longer exists; the caller gets
    /// an empty file and a zero count.
    pub async fn download_file(&self, file: &FileMeta) -> Result<u64> {
        let mut stream = self.connect(&file.addr).await?;
        self.with_deadline(&file.addr, async {
            framing::send_request(&mut stream, RequestToken::DownloadFile).await?;
            framing::expect_ok(&mut stream).await?;
            framing::send_payload(&mut stream, file).await?;
            framing::expect_ok(&mut stream).await?;
            let mut out = self.store.open_write(Area::Share, &file.filename).await?;
            let received = framing::recv_body(&mut stream, &mut out).await?;
            tracing::info!(filename = %file.filename, bytes = received, "file downloaded");
            Ok(received)
        })
        .await
    }

    /// `SubscribeFile`: subscribe to a sync file at `source` and fetch
    /// its content into `SyncFiles/`.
    ///
    /// Returns the number of bytes received.
    pub async fn subscribe_file(&self, source: &PeerAddr, sync_file: &SyncFile) -> Result<u64> {
        let mut stream = self.connect(source).await?;
        self.with_deadline(source, async {
            framing::send_request(&mut stream, RequestToken::SubscribeFile).await?;
            framing::expect_ok(&mut stream).await?;
            framing::send_payload(&mut stream, &self.self_peer).await?;
            framing::expect_ok(&mut stream).await?;
            framing::send_payload(&mut stream, sync_file).await?;
            framing::expect_ok(&mut stream).await?;
            let mut out = self
                .store
                .open_write(Area::Sync, &sync_file.filename)
                .await?;
            let received = framing::recv_body(&mut stream, &mut out).await?;
            tracing::info!(filename = %sync_file.filename, bytes = received, "subscribed");
            Ok(received)
        })
        .await
    }

    /// `UserSubscribed`: tell an existing subscriber about a new one.
    pub async fn user_subscribed(
        &self,
        target: &PeerAddr,
        new_subscriber: &Peer,
        sync_file: &SyncFile,
    ) -> Result<()> {
        let mut stream = self.connect(target).await?;
        self.with_deadline(target, async {
            framing::send_request(&mut stream, RequestToken::UserSubscribed).await?;
            framing::expect_ok(&mut stream).await?;
            framing::send_payload(&mut stream, new_subscriber).await?;
            framing::expect_ok(&mut stream).await?;
            framing::send_payload(&mut stream, sync_file).await?;
            Ok(())
        })
        .await
    }

    /// `SyncFileUpdate`: push the current content of a sync file to one
    /// subscriber.
    pub async fn sync_file_update(&self, target: &PeerAddr, sync_file: &SyncFile) -> Result<()> {
        let mut stream = self.connect(target).await?;
        self.with_deadline(target, async {
            framing::send_request(&mut stream, RequestToken::SyncFileUpdate).await?;
            framing::expect_ok(&mut stream).await?;
            framing::send_payload(&mut stream, sync_file).await?;
            framing::expect_ok(&mut stream).await?;
            let len = self.store.size(Area::Sync, &sync_file.filename).await?;
            let mut src = self
                .store
                .open_read(Area::Sync, &sync_file.filename)
                .await?;
            framing::send_body(&mut stream, &mut src, len).await?;
            framing::expect_ok(&mut stream).await?;
            Ok(())
        })
        .await
    }
}
