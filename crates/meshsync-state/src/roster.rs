//! The set of peers the node believes is online.

use meshsync_proto::Peer;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Mutex-guarded peer set. Never contains the node's own peer record;
/// entries are unique by (addr, username).
#[derive(Debug, Clone)]
pub struct Roster {
    self_peer: Peer,
    peers: Arc<Mutex<Vec<Peer>>>,
}

impl Roster {
    /// Create an empty roster for a node with the given identity.
    pub fn new(self_peer: Peer) -> Self {
        Roster {
            self_peer,
            peers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The local node's own peer record.
    pub fn self_peer(&self) -> &Peer {
        &self.self_peer
    }

    /// Insert a peer unless it is the self-peer or already present.
    ///
    /// Returns true if the roster changed.
    pub async fn insert(&self, peer: Peer) -> bool {
        if peer == self.self_peer {
            return false;
        }
        let mut peers = self.peers.lock().await;
        if peers.contains(&peer) {
            return false;
        }
        tracing::debug!(peer = %peer, "roster insert");
        peers.push(peer);
        true
    }

    /// Whether the given peer is in the roster.
    pub async fn contains(&self, peer: &Peer) -> bool {
        self.peers.lock().await.contains(peer)
    }

    /// A snapshot copy of the roster for iteration outside the lock.
    pub async fn snapshot(&self) -> Vec<Peer> {
        self.peers.lock().await.clone()
    }

    /// Merge a received peer list, skipping self and duplicates.
    ///
    /// Returns the number of peers added.
    pub async fn merge(&self, incoming: Vec<Peer>) -> usize {
        let mut peers = self.peers.lock().await;
        let mut added = 0;
        for peer in incoming {
            if peer == self.self_peer || peers.contains(&peer) {
                continue;
            }
            peers.push(peer);
            added += 1;
        }
        added
    }

    /// Number of known peers.
    pub async fn len(&self) -> usize {
        self.peers.lock().await.len()
    }

    /// Whether no peers are known.
    pub async fn is_empty(&self) -> bool {
        self.peers.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshsync_proto::PeerAddr;

    fn peer(port: u16, name: &str) -> Peer {
        Peer::new(PeerAddr::new("127.0.0.1", port), name)
    }

    #[tokio::test]
    async fn test_insert_dedupes() {
        let roster = Roster::new(peer(50001, "A"));
        assert!(roster.insert(peer(50002, "B")).await);
        assert!(!roster.insert(peer(50002, "B")).await);
        assert_eq!(roster.len().await, 1);
    }

    #[tokio::test]
    async fn test_self_peer_never_inserted() {
        let me = peer(50001, "A");
        let roster = Roster::new(me.clone());
        assert!(!roster.insert(me.clone()).await);
        assert!(roster.merge(vec![me, peer(50002, "B")]).await == 1);
        assert_eq!(roster.len().await, 1);
    }

    #[tokio::test]
    async fn test_same_addr_different_username_is_distinct() {
        let roster = Roster::new(peer(50001, "A"));
        assert!(roster.insert(peer(50002, "B")).await);
        assert!(roster.insert(peer(50002, "C")).await);
        assert_eq!(roster.len().await, 2);
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy() {
        let roster = Roster::new(peer(50001, "A"));
        roster.insert(peer(50002, "B")).await;
        let snap = roster.snapshot().await;
        roster.insert(peer(50003, "C")).await;
        assert_eq!(snap.len(), 1);
        assert_eq!(roster.len().await, 2);
    }
}
