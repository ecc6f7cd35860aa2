#![warn(missing_docs)]

//! meshsync storage subsystem: the two node data directories and content digesting

pub mod digest;
pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{Area, FileStore};
