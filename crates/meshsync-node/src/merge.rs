//! Merge rules for advertised catalogs and sync-file descriptors.
//!
//! The same rules apply whether a list arrives via a `SendFiles` /
//! `SendSyncFiles` request or is fetched during the initial join: an
//! entry is dropped if its filename is already known, or if a local file
//! of that name already sits in the corresponding directory.

use meshsync_proto::{FileMeta, SyncFile};
use meshsync_state::NodeState;
use meshsync_store::{Area, FileStore};

/// Merge advertised file descriptors into the catalog.
///
/// Returns the number of entries accepted.
pub async fn merge_files(state: &NodeState, store: &FileStore, incoming: Vec<FileMeta>) -> usize {
    let mut added = 0;
    for file in incoming {
        if store.contains(Area::Share, &file.filename).await {
            continue;
        }
        if state.catalog().insert_if_new(file).await {
            added += 1;
        }
    }
    added
}

/// Merge advertised sync-file descriptors into the subscription table.
///
/// Returns the number of entries accepted.
pub async fn merge_sync_files(
    state: &NodeState,
    store: &FileStore,
    incoming: Vec<SyncFile>,
) -> usize {
    let mut added = 0;
    for sync_file in incoming {
        if store.contains(Area::Sync, &sync_file.filename).await {
            continue;
        }
        if state.subscriptions().insert_if_new(sync_file).await {
            added += 1;
        }
    }
    added
}
