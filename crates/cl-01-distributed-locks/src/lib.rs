//! # CL-01: Distributed Locks
//!
//! Mutual exclusion over named resources for replicated worker processes
//! (e.g. "only one instance runs the nightly report").
//!
//! ## Protocol
//!
//! ```text
//! acquire:  SET lock:{resource_id} {token} NX PX {ttl}   (poll until timeout)
//! release:  DEL lock:{resource_id}        if value == token   (atomic)
//! extend:   PEXPIRE lock:{resource_id}    if value == token   (atomic)
//! ```
//!
//! The store TTL is authoritative. A holder that stalls past its TTL loses
//! the lock silently and finds out on the next release or extend
//! (`LockError::OwnershipMismatch`).
//!
//! ## Guarantees
//!
//! | Property | Mechanism |
//! |----------|-----------|
//! | At most one holder per resource | set-if-absent on one key |
//! | Only the holder releases / extends | token compared inside the store |
//! | Crashed holders don't block forever | key TTL |
//!
//! No fairness or queuing among waiters.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

pub use config::LockConfig;
pub use domain::{DistributedLock, LockError, LockStats};
pub use ports::inbound::LockApi;
pub use service::DistributedLockManager;
