//! Aggregate node state passed to every handler and client operation.

use meshsync_proto::{FileMeta, Peer};

use crate::catalog::Catalog;
use crate::roster::Roster;
use crate::subscriptions::SubscriptionTable;

/// The node's shared mutable collections plus its immutable identity.
///
/// One instance is created by the supervisor and cloned (cheaply, the
/// collections are behind `Arc`s) into the server, the client operations,
/// and the sync watcher. When an operation needs more than one lock, it
/// takes them in roster, subscriptions, catalog order.
#[derive(Debug, Clone)]
pub struct NodeState {
    roster: Roster,
    subscriptions: SubscriptionTable,
    catalog: Catalog,
    initial_files: Vec<FileMeta>,
}

impl NodeState {
    /// Build the state for a node with the given identity.
    ///
    /// `initial_files` is the listing of the node's own `Files/`
    /// directory at startup; it is immutable for the node's lifetime and
    /// needs no lock.
    pub fn new(self_peer: Peer, initial_files: Vec<FileMeta>) -> Self {
        NodeState {
            roster: Roster::new(self_peer),
            subscriptions: SubscriptionTable::new(),
            catalog: Catalog::new(),
            initial_files,
        }
    }

    /// The local node's own peer record.
    pub fn self_peer(&self) -> &Peer {
        self.roster.self_peer()
    }

    /// The peer roster.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// The sync-file subscription table.
    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    /// The available-files catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The node's own files present on disk at startup.
    pub fn initial_files(&self) -> &[FileMeta] {
        &self.initial_files
    }

    /// The full catalog as exposed to peers: peer-advertised entries plus
    /// the node's own initial files.
    pub async fn exported_catalog(&self) -> Vec<FileMeta> {
        let mut files = self.catalog.snapshot().await;
        files.extend(self.initial_files.iter().cloned());
        files
    }
}
