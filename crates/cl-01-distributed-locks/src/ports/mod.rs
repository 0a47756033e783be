//! Ports
//!
//! The lock manager's only driven port is the shared
//! [`CoordinationStore`](shared_store::CoordinationStore).

pub mod inbound;

pub use inbound::LockApi;
