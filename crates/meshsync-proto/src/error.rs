//! Protocol error types for the meshsync wire layer.

use thiserror::Error;

/// Errors that can occur while encoding or decoding wire traffic.
#[derive(Error, Debug)]
pub enum ProtoError {
    /// The peer closed the connection before a declared length was satisfied.
    #[error("Truncated read: expected {expected} more bytes")]
    Truncated {
        /// Bytes still owed when EOF was observed.
        expected: u64,
    },

    /// A request tag field could not be decoded into a known token.
    #[error("Unknown request tag: {tag:?}")]
    UnknownTag {
        /// The tag text after NUL-stripping.
        tag: String,
    },

    /// A tag field was not valid NUL-padded ASCII.
    #[error("Malformed tag field: {reason}")]
    MalformedTag {
        /// Reason why the field is invalid.
        reason: String,
    },

    /// The client expected an `Ok` status and received something else.
    #[error("Unexpected status: {status:?}")]
    UnexpectedStatus {
        /// The status text received.
        status: String,
    },

    /// A structured payload exceeds the maximum permitted size.
    #[error("Payload too large: {size} bytes (max {max_size})")]
    PayloadTooLarge {
        /// Declared payload length.
        size: u64,
        /// Maximum accepted length.
        max_size: u64,
    },

    /// A structured payload was not valid JSON for the expected shape.
    #[error("Payload decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// I/O error from the underlying stream.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for wire operations.
pub type Result<T> = std::result::Result<T, ProtoError>;
