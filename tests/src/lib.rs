//! # Coordination Layer Test Suite
//!
//! Cross-component flows run against the in-memory store and hub. Several
//! [`CoordinationContext`](coordination_runtime::CoordinationContext)s built
//! on one [`fixtures::TestCluster`] behave like separate processes sharing a
//! Redis instance.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Cluster, collectors, polling helpers
//! └── integration/      # Cross-component flows
//!     ├── broadcast.rs  # Cache invalidation and pattern fan-out
//!     ├── locks.rs      # Contention across processes
//!     ├── ordering.rs   # Sequencing, retries, dead letters
//!     ├── reconnect.rs  # Transport loss and backoff
//!     └── runtime.rs    # Runtime lifecycle
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p cl-tests
//! cargo test -p cl-tests integration::locks::
//! cargo bench -p cl-tests
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod fixtures;
pub mod integration;
