#![warn(missing_docs)]

//! meshsync shared state: the three mutex-guarded collections every handler works against
//!
//! Lock ordering when more than one collection is needed:
//! roster, then subscriptions, then catalog.

pub mod catalog;
pub mod node;
pub mod roster;
pub mod subscriptions;

pub use catalog::Catalog;
pub use node::NodeState;
pub use roster::Roster;
pub use subscriptions::SubscriptionTable;
