//! The set of files the node believes is available for one-shot download.

use meshsync_proto::FileMeta;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Mutex-guarded catalog of peer-advertised file descriptors.
///
/// Self-owned files live in the immutable `initial_files` list on
/// [`crate::NodeState`], not here, so the catalog as exposed to peers
/// never advertises the asking node's own content back to it.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    files: Arc<Mutex<Vec<FileMeta>>>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Catalog::default()
    }

    /// Insert a descriptor unless one with the same filename exists.
    ///
    /// Returns true if the catalog changed.
    pub async fn insert_if_new(&self, file: FileMeta) -> bool {
        let mut files = self.files.lock().await;
        if files.iter().any(|f| f.filename == file.filename) {
            return false;
        }
        tracing::debug!(filename = %file.filename, owner = %file.username, "catalog insert");
        files.push(file);
        true
    }

    /// Whether any entry carries the given filename.
    pub async fn contains_filename(&self, filename: &str) -> bool {
        self.files
            .lock()
            .await
            .iter()
            .any(|f| f.filename == filename)
    }

    /// A snapshot copy of the catalog.
    pub async fn snapshot(&self) -> Vec<FileMeta> {
        self.files.lock().await.clone()
    }

    /// Number of catalog entries.
    pub async fn len(&self) -> usize {
        self.files.lock().await.len()
    }

    /// Whether the catalog is empty.
    pub async fn is_empty(&self) -> bool {
        self.files.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshsync_proto::{Peer, PeerAddr};

    fn file(name: &str, port: u16, owner: &str) -> FileMeta {
        FileMeta::new(name, &Peer::new(PeerAddr::new("127.0.0.1", port), owner))
    }

    #[tokio::test]
    async fn test_insert_if_new_dedupes_by_filename() {
        let catalog = Catalog::new();
        assert!(catalog.insert_if_new(file("a.txt", 50001, "A")).await);
        // Same filename from a different owner still collides.
        assert!(!catalog.insert_if_new(file("a.txt", 50002, "B")).await);
        assert_eq!(catalog.len().await, 1);
    }

    #[tokio::test]
    async fn test_distinct_filenames_commute() {
        let c1 = Catalog::new();
        c1.insert_if_new(file("a.txt", 50001, "A")).await;
        c1.insert_if_new(file("b.txt", 50002, "B")).await;

        let c2 = Catalog::new();
        c2.insert_if_new(file("b.txt", 50002, "B")).await;
        c2.insert_if_new(file("a.txt", 50001, "A")).await;

        let mut s1 = c1.snapshot().await;
        let mut s2 = c2.snapshot().await;
        s1.sort_by(|a, b| a.filename.cmp(&b.filename));
        s2.sort_by(|a, b| a.filename.cmp(&b.filename));
        assert_eq!(s1, s2);
    }

    #[tokio::test]
    async fn test_contains_filename() {
        let catalog = Catalog::new();
        catalog.insert_if_new(file("a.txt", 50001, "A")).await;
        assert!(catalog.contains_filename("a.txt").await);
        assert!(!catalog.contains_filename("b.txt").await);
    }
}
