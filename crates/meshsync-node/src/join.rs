//! Initial join: the six-step bootstrap sequence against a supplied peer.
//!
//! Every step tolerates per-peer failure; a refused or timed-out peer is
//! logged and skipped, and the join carries on. A node with no bootstrap
//! peer simply waits to be joined.

use meshsync_proto::{PeerAddr, SyncFile};
use meshsync_state::NodeState;
use meshsync_store::{Area, FileStore};

use crate::client::NodeClient;
use crate::merge;

/// Run the initial join against `bootstrap`.
///
/// 1. `AddMe` with the self-peer.
/// 2. `RequestPeerList`, merged into the roster (self excluded).
/// 3. `RequestFiles` against the last merged peer, merged into the catalog.
/// 4. `SendFiles` of the local `Files/` listing to every peer.
/// 5. `RequestSyncFiles` from every peer, merged into the subscriptions.
/// 6. `SendSyncFiles` of the local `SyncFiles/` listing (self as the only
///    subscriber) to every peer.
pub async fn initial_join(
    client: &NodeClient,
    state: &NodeState,
    store: &FileStore,
    bootstrap: &PeerAddr,
) {
    tracing::info!(bootstrap = %bootstrap, "initial join starting");

    if let Err(e) = client.add_me(bootstrap).await {
        tracing::warn!(bootstrap = %bootstrap, error = %e, "AddMe failed");
    }

    match client.request_peer_list(bootstrap).await {
        Ok(peers) => {
            let added = state.roster().merge(peers).await;
            tracing::info!(added, "peer list merged");
        }
        Err(e) => tracing::warn!(bootstrap = %bootstrap, error = %e, "RequestPeerList failed"),
    }

    let roster = state.roster().snapshot().await;

    // The catalog is mesh-wide state, so one peer's copy is enough.
    if let Some(peer) = roster.last() {
        match client.request_files(&peer.addr).await {
            Ok(files) => {
                merge::merge_files(state, store, files).await;
            }
            Err(e) => tracing::warn!(peer = %peer, error = %e, "RequestFiles failed"),
        }
    }

    let local_files = state.initial_files().to_vec();
    if !local_files.is_empty() {
        for peer in &roster {
            if let Err(e) = client.send_files(&peer.addr, &local_files).await {
                tracing::warn!(peer = %peer, error = %e, "SendFiles failed");
            }
        }
    }

    for peer in &roster {
        match client.request_sync_files(&peer.addr).await {
            Ok(sync_files) => {
                merge::merge_sync_files(state, store, sync_files).await;
            }
            Err(e) => tracing::warn!(peer = %peer, error = %e, "RequestSyncFiles failed"),
        }
    }

    let local_sync_files = local_sync_listing(client, store).await;
    if !local_sync_files.is_empty() {
        for peer in &roster {
            if let Err(e) = client.send_sync_files(&peer.addr, &local_sync_files).await {
                tracing::warn!(peer = %peer, error = %e, "SendSyncFiles failed");
            }
        }
    }

    tracing::info!(
        peers = roster.len(),
        "initial join finished"
    );
}

/// The local `SyncFiles/` listing as descriptors with self as the only
/// subscriber.
async fn local_sync_listing(client: &NodeClient, store: &FileStore) -> Vec<SyncFile> {
    let names = match store.list(Area::Sync).await {
        Ok(names) => names,
        Err(e) => {
            tracing::warn!(error = %e, "could not list SyncFiles");
            return Vec::new();
        }
    };
    names
        .into_iter()
        .map(|name| SyncFile::new(name, vec![client.self_peer().clone()]))
        .collect()
}
