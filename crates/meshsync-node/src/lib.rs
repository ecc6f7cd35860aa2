#![warn(missing_docs)]

//! meshsync node runtime: server loop, client operations, sync watcher, supervisor

pub mod client;
pub mod config;
pub mod error;
pub mod fanout;
pub mod join;
pub mod merge;
pub mod server;
pub mod supervisor;
pub mod watcher;

pub use config::NodeConfig;
pub use error::{NodeError, Result};
pub use supervisor::Node;
