//! Storage error types.

use thiserror::Error;

/// Errors from the node's data directories.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A named file does not exist in the directory it was looked up in.
    #[error("File not found: {name}")]
    NotFound {
        /// The file name that was requested.
        name: String,
    },

    /// A file name that would escape the data directory was rejected.
    #[error("Invalid file name: {name}")]
    InvalidName {
        /// The offending name.
        name: String,
    },

    /// I/O error from the filesystem.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
