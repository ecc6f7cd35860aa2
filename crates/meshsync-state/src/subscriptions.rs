//! The sync-file subscription table.
//!
//! One table holds every known sync file. An entry is *subscribed* iff
//! the local node appears in its `users_subbed`; otherwise it is merely
//! available to subscribe to. A tracked entry's subscriber list is never
//! empty.

use meshsync_proto::{Peer, SyncFile};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Mutex-guarded table of sync-file descriptors, unique by filename.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionTable {
    entries: Arc<Mutex<Vec<SyncFile>>>,
}

impl SubscriptionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        SubscriptionTable::default()
    }

    /// Insert a descriptor unless its filename is already tracked or its
    /// subscriber list is empty.
    ///
    /// Returns true if the table changed.
    pub async fn insert_if_new(&self, sync_file: SyncFile) -> bool {
        if sync_file.users_subbed.is_empty() {
            return false;
        }
        let mut entries = self.entries.lock().await;
        if entries.iter().any(|s| s.filename == sync_file.filename) {
            return false;
        }
        tracing::debug!(filename = %sync_file.filename, "subscription table insert");
        entries.push(sync_file);
        true
    }

    /// Whether any entry carries the given filename.
    pub async fn contains_filename(&self, filename: &str) -> bool {
        self.entries
            .lock()
            .await
            .iter()
            .any(|s| s.filename == filename)
    }

    /// A clone of the entry for the given filename.
    pub async fn get(&self, filename: &str) -> Option<SyncFile> {
        self.entries
            .lock()
            .await
            .iter()
            .find(|s| s.filename == filename)
            .cloned()
    }

    /// Append a subscriber to the entry for `filename`, deduplicated by
    /// (addr, username).
    ///
    /// Returns true if the entry exists and the peer was newly added.
    pub async fn add_subscriber(&self, filename: &str, peer: Peer) -> bool {
        let mut entries = self.entries.lock().await;
        match entries.iter_mut().find(|s| s.filename == filename) {
            Some(entry) => entry.add_subscriber(peer),
            None => false,
        }
    }

    /// A snapshot copy of the whole table.
    pub async fn snapshot(&self) -> Vec<SyncFile> {
        self.entries.lock().await.clone()
    }

    /// Entries the given peer is subscribed to.
    pub async fn subscribed_by(&self, peer: &Peer) -> Vec<SyncFile> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|s| s.is_subscriber(peer))
            .cloned()
            .collect()
    }

    /// Entries the given peer is not subscribed to (available to join).
    pub async fn available_to(&self, peer: &Peer) -> Vec<SyncFile> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|s| !s.is_subscriber(peer))
            .cloned()
            .collect()
    }

    /// Number of tracked entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the table is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
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
    async fn test_insert_rejects_duplicate_filename() {
        let table = SubscriptionTable::new();
        assert!(
            table
                .insert_if_new(SyncFile::new("notes.md", vec![peer(50001, "A")]))
                .await
        );
        assert!(
            !table
                .insert_if_new(SyncFile::new("notes.md", vec![peer(50002, "B")]))
                .await
        );
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn test_insert_rejects_empty_subscriber_list() {
        let table = SubscriptionTable::new();
        assert!(!table.insert_if_new(SyncFile::new("notes.md", vec![])).await);
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn test_add_subscriber_dedupes() {
        let table = SubscriptionTable::new();
        table
            .insert_if_new(SyncFile::new("notes.md", vec![peer(50001, "A")]))
            .await;
        assert!(table.add_subscriber("notes.md", peer(50002, "B")).await);
        assert!(!table.add_subscriber("notes.md", peer(50002, "B")).await);
        let entry = table.get("notes.md").await.unwrap();
        assert_eq!(entry.users_subbed.len(), 2);
    }

    #[tokio::test]
    async fn test_add_subscriber_unknown_filename() {
        let table = SubscriptionTable::new();
        assert!(!table.add_subscriber("ghost.md", peer(50002, "B")).await);
    }

    #[tokio::test]
    async fn test_subscribed_and_available_partition() {
        let me = peer(50001, "A");
        let other = peer(50002, "B");
        let table = SubscriptionTable::new();
        table
            .insert_if_new(SyncFile::new("mine.md", vec![me.clone()]))
            .await;
        table
            .insert_if_new(SyncFile::new("theirs.md", vec![other.clone()]))
            .await;

        let subscribed = table.subscribed_by(&me).await;
        assert_eq!(subscribed.len(), 1);
        assert_eq!(subscribed[0].filename, "mine.md");

        let available = table.available_to(&me).await;
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].filename, "theirs.md");
    }
}
