//! # CL-02: Message Ordering
//!
//! Imposes a usable processing order on an unordered, at-least-once
//! transport: every accepted message gets a global sequence from the shared
//! counter and a local sequence within its partition, and consumers take
//! messages lowest global sequence first.
//!
//! ## Lifecycle
//!
//! ```text
//! [PENDING] ──dequeue──→ [PROCESSING] ──processed──→ [COMPLETED]
//!     ↑                        │
//!     │                        └──failed──→ [FAILED] ──retry_count > max_retries──→ [DEAD_LETTER]
//!     │                                        │
//!     └───────────────────retry────────────────┘
//! ```
//!
//! A message failing `max_retries + 1` times is appended to
//! `dead_letter_queue` exactly once and never redelivered automatically.
//!
//! ## Invariants
//!
//! | Invariant | Enforcement |
//! |-----------|-------------|
//! | Global sequence strictly increasing | atomic `INCR global_sequence` |
//! | Local sequence monotonic per partition | `PartitionCounters` or `INCR partition_sequence:{key}` |
//! | Terminal states stay terminal | `MessageStatus::can_transition_to` |
//! | Processed ids are not re-accepted | `DuplicateDetector` before sequencing |
//!
//! Duplicate detection is check-then-act. Two processes receiving the same
//! id at the same moment may both enqueue it.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

pub use config::{OrderingConfig, PartitionScope, RetrySequencing};
pub use domain::{EnqueueOutcome, FailureOutcome, OrderingError};
pub use ports::inbound::MessageOrderingApi;
pub use service::MessageOrderingManager;
