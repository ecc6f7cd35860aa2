//! Structured payload records carried on the wire.
//!
//! The three record shapes (peer, file descriptor, sync-file descriptor)
//! serialize as JSON objects with exactly these field names. The address
//! pair serializes as a 2-element array `["host", port]`, so decoders on
//! either side agree on the shape regardless of implementation language.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A network address as the protocol carries it: host string plus port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddr(pub String, pub u16);

impl PeerAddr {
    /// Build an address from host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        PeerAddr(host.into(), port)
    }

    /// The host component.
    pub fn host(&self) -> &str {
        &self.0
    }

    /// The port component.
    pub fn port(&self) -> u16 {
        self.1
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0, self.1)
    }
}

/// Identity of a node in the mesh.
///
/// Two peers are the same node iff both address and username match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    /// Listening address of the node.
    pub addr: PeerAddr,
    /// Username chosen at node start.
    pub username: String,
}

impl Peer {
    /// Build a peer record.
    pub fn new(addr: PeerAddr, username: impl Into<String>) -> Self {
        Peer {
            addr,
            username: username.into(),
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.addr)
    }
}

/// Descriptor of a blob available for one-shot download.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileMeta {
    /// File name, unique within its owner's share directory.
    pub filename: String,
    /// Username of the owning node.
    pub username: String,
    /// Address of the owning node.
    pub addr: PeerAddr,
}

impl FileMeta {
    /// Build a file descriptor owned by the given peer.
    pub fn new(filename: impl Into<String>, owner: &Peer) -> Self {
        FileMeta {
            filename: filename.into(),
            username: owner.username.clone(),
            addr: owner.addr.clone(),
        }
    }
}

/// Descriptor of a subscribed document.
///
/// The first entry of `users_subbed` is the canonical source: the peer a
/// new subscriber contacts to fetch content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFile {
    /// Document name within `SyncFiles/`.
    pub filename: String,
    /// Subscribers, in subscription order. Never empty for a tracked file.
    pub users_subbed: Vec<Peer>,
}

impl SyncFile {
    /// Build a descriptor with an initial subscriber list.
    pub fn new(filename: impl Into<String>, users_subbed: Vec<Peer>) -> Self {
        SyncFile {
            filename: filename.into(),
            users_subbed,
        }
    }

    /// The canonical source for this document, if any subscriber exists.
    pub fn source(&self) -> Option<&Peer> {
        self.users_subbed.first()
    }

    /// Whether the given peer is already subscribed.
    pub fn is_subscriber(&self, peer: &Peer) -> bool {
        self.users_subbed.contains(peer)
    }

    /// Append a subscriber unless it is already present.
    ///
    /// Returns true if the peer was added.
    pub fn add_subscriber(&mut self, peer: Peer) -> bool {
        if self.is_subscriber(&peer) {
            return false;
        }
        self.users_subbed.push(peer);
        true
    }
}
