#![warn(missing_docs)]

//! meshsync wire protocol: fixed-width request tags, length-prefixed JSON payloads, streamed bodies

pub mod error;
pub mod framing;
pub mod record;
pub mod token;

pub use error::{ProtoError, Result};
pub use record::{FileMeta, Peer, PeerAddr, SyncFile};
pub use token::{RequestToken, StatusToken};
