//! Sync watcher: periodic change detection over `SyncFiles/`.
//!
//! The watcher owns a private filename-to-digest map; no lock is shared
//! with the request handlers. Each pass reconciles the map with the
//! directory (dropping vanished files, digesting new ones) and, only when
//! the save flag is armed, recomputes digests and propagates changed
//! files to their subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use meshsync_state::NodeState;
use meshsync_store::{digest, Area, FileStore};

use crate::client::NodeClient;
use crate::fanout;

/// Clone-able handle that arms the watcher's save flag.
///
/// Arming tells the next watcher pass to recompute digests and propagate
/// whatever changed. The flag is cleared by the pass that consumes it.
#[derive(Debug, Clone)]
pub struct SaveTrigger(Arc<AtomicBool>);

impl SaveTrigger {
    /// Arm the save flag.
    pub fn arm(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// The periodic change detector.
pub struct SyncWatcher {
    state: NodeState,
    store: FileStore,
    client: NodeClient,
    save_flag: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl SyncWatcher {
    /// Build a watcher over the node's sync directory.
    pub fn new(
        state: NodeState,
        store: FileStore,
        client: NodeClient,
        poll_interval: Duration,
    ) -> Self {
        SyncWatcher {
            state,
            store,
            client,
            save_flag: Arc::new(AtomicBool::new(false)),
            poll_interval,
        }
    }

    /// A handle for arming the save flag from outside the watcher task.
    pub fn trigger(&self) -> SaveTrigger {
        SaveTrigger(Arc::clone(&self.save_flag))
    }

    /// Poll until the shutdown flag flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut digests: HashMap<String, String> = HashMap::new();
        self.reconcile(&mut digests).await;
        tracing::debug!(tracked = digests.len(), "sync watcher started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("sync watcher stopping");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            self.reconcile(&mut digests).await;

            if self.save_flag.swap(false, Ordering::SeqCst) {
                self.propagate_changes(&mut digests).await;
            }
        }
    }

    /// Bring the digest map in line with the directory listing: drop
    /// entries whose files vanished, digest files not yet tracked.
    async fn reconcile(&self, digests: &mut HashMap<String, String>) {
        let names = match self.store.list(Area::Sync).await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(error = %e, "could not list SyncFiles");
                return;
            }
        };

        digests.retain(|name, _| names.iter().any(|n| n == name));

        for name in names {
            if digests.contains_key(&name) {
                continue;
            }
            match self.digest_of(&name).await {
                Ok(hex) => {
                    digests.insert(name, hex);
                }
                Err(e) => tracing::warn!(filename = %name, error = %e, "digest failed"),
            }
        }
    }

    /// Recompute digests for every tracked file; push changed files to
    /// their subscribers.
    async fn propagate_changes(&self, digests: &mut HashMap<String, String>) {
        let names: Vec<String> = digests.keys().cloned().collect();
        for name in names {
            let previous = digests.get(&name).cloned().unwrap_or_default();
            let current = match self.digest_of(&name).await {
                Ok(hex) => hex,
                Err(e) => {
                    tracing::warn!(filename = %name, error = %e, "digest failed");
                    continue;
                }
            };
            if current == previous {
                continue;
            }
            digests.insert(name.clone(), current);

            let Some(entry) = self.state.subscriptions().get(&name).await else {
                tracing::debug!(filename = %name, "changed file has no subscription record");
                continue;
            };
            let me = self.state.self_peer();
            let recipients: Vec<_> = entry
                .users_subbed
                .iter()
                .filter(|p| *p != me)
                .cloned()
                .collect();
            if recipients.is_empty() {
                tracing::debug!(filename = %name, "no subscribers to notify");
                continue;
            }
            tracing::info!(
                filename = %name,
                recipients = recipients.len(),
                "propagating sync file update"
            );
            fanout::propagate_sync_update(&self.client, &recipients, &entry).await;
        }
    }

    async fn digest_of(&self, name: &str) -> meshsync_store::Result<String> {
        let path = self.store.path_of(Area::Sync, name)?;
        digest::md5_hex(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshsync_proto::{Peer, PeerAddr};
    use tokio::io::AsyncWriteExt;

    async fn watcher_fixture() -> (tempfile::TempDir, SyncWatcher) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let me = Peer::new(PeerAddr::new("127.0.0.1", 50001), "A");
        let state = NodeState::new(me.clone(), vec![]);
        let client = NodeClient::new(
            me,
            store.clone(),
            Duration::from_millis(200),
            Duration::from_secs(1),
        );
        let watcher = SyncWatcher::new(state, store, client, Duration::from_millis(20));
        (dir, watcher)
    }

    async fn write_sync_file(watcher: &SyncWatcher, name: &str, content: &[u8]) {
        let mut f = watcher.store.open_write(Area::Sync, name).await.unwrap();
        f.write_all(content).await.unwrap();
    }

    #[tokio::test]
    async fn test_reconcile_tracks_new_and_drops_vanished() {
        let (_dir, watcher) = watcher_fixture().await;
        write_sync_file(&watcher, "notes.md", b"v1").await;

        let mut digests = HashMap::new();
        watcher.reconcile(&mut digests).await;
        assert!(digests.contains_key("notes.md"));

        tokio::fs::remove_file(watcher.store.path_of(Area::Sync, "notes.md").unwrap())
            .await
            .unwrap();
        watcher.reconcile(&mut digests).await;
        assert!(digests.is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_skips_editor_backups() {
        let (_dir, watcher) = watcher_fixture().await;
        write_sync_file(&watcher, "notes.md~", b"backup").await;

        let mut digests = HashMap::new();
        watcher.reconcile(&mut digests).await;
        assert!(digests.is_empty());
    }

    #[tokio::test]
    async fn test_propagate_updates_digest_even_without_subscribers() {
        let (_dir, watcher) = watcher_fixture().await;
        write_sync_file(&watcher, "notes.md", b"v1").await;

        let mut digests = HashMap::new();
        watcher.reconcile(&mut digests).await;
        let before = digests.get("notes.md").unwrap().clone();

        write_sync_file(&watcher, "notes.md", b"v2").await;
        watcher.propagate_changes(&mut digests).await;
        let after = digests.get("notes.md").unwrap().clone();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_trigger_arms_and_pass_clears() {
        let (_dir, watcher) = watcher_fixture().await;
        let trigger = watcher.trigger();
        trigger.arm();
        assert!(watcher.save_flag.swap(false, Ordering::SeqCst));
        assert!(!watcher.save_flag.load(Ordering::SeqCst));
    }
}
