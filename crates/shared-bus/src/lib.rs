//! # Shared Bus - Pub/Sub Broker and Duplicate Detection
//!
//! Broadcast plumbing of the coordination layer.
//!
//! ## Components
//!
//! | Component | Role |
//! |-----------|------|
//! | [`PubSubBroker`] | subscribe / unsubscribe / publish, background listen loop |
//! | [`PubSubTransport`] | the wire (in-memory hub, Redis with `redis`) |
//! | [`DuplicateDetector`] | two-tier idempotency filter keyed by envelope id |
//! | [`ExponentialBackoff`] | reconnect delay of the listen loop |
//!
//! ## Delivery
//!
//! ```text
//! ┌──────────────┐  publish()  ┌──────────────┐  receive()  ┌──────────────┐
//! │  Process A   │ ──────────→ │  Transport   │ ──────────→ │  Process B   │
//! │   broker     │             │ (hub/Redis)  │             │ listen loop  │
//! └──────────────┘             └──────────────┘             └──────────────┘
//! ```
//!
//! No ordering or delivery guarantee at this layer. Sequenced processing is
//! the ordering manager's job.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod backoff;
pub mod broker;
pub mod dedup;
pub mod handler;
#[cfg(feature = "redis")]
pub mod redis_transport;
pub mod registry;
pub mod transport;

pub use backoff::ExponentialBackoff;
pub use broker::{BrokerConfig, BrokerStats, PubSubBroker};
pub use dedup::{DedupConfig, DuplicateDetector, DEFAULT_DEDUP_TTL};
pub use handler::{AsyncFnHandler, FnHandler, HandlerError, MessageHandler};
#[cfg(feature = "redis")]
pub use redis_transport::RedisTransport;
pub use registry::{ChannelKind, HandlerRegistry};
pub use transport::{InMemoryPubSub, InMemoryTransport, PubSubTransport, TransportMessage};

/// Messages buffered per in-memory connection before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
