//! Node runtime error types.

use thiserror::Error;

/// Errors from the node runtime: transport, framing, and storage.
#[derive(Error, Debug)]
pub enum NodeError {
    /// An outbound connection attempt timed out.
    #[error("Connection to {addr} timed out after {timeout_ms}ms")]
    ConnectTimeout {
        /// Remote address for the timed-out connection.
        addr: String,
        /// Timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// A full request exchange did not complete within its deadline.
    #[error("Exchange with {addr} timed out after {timeout_ms}ms")]
    ExchangeTimeout {
        /// Remote address of the slow exchange.
        addr: String,
        /// Timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// A download was requested for a filename the catalog does not know.
    #[error("No catalog entry for {filename}")]
    UnknownFile {
        /// The requested filename.
        filename: String,
    },

    /// A subscribe was requested for an untracked sync file.
    #[error("No sync-file record for {filename}")]
    UnknownSyncFile {
        /// The requested filename.
        filename: String,
    },

    /// Wire protocol error.
    #[error(transparent)]
    Proto(#[from] meshsync_proto::ProtoError),

    /// Data directory error.
    #[error(transparent)]
    Store(#[from] meshsync_store::StoreError),

    /// I/O error outside the codec (bind, accept, connect).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
