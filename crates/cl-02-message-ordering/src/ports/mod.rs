//! Ports
//!
//! Driven ports are the shared [`CoordinationStore`](shared_store::CoordinationStore)
//! and the [`DuplicateDetector`](shared_bus::DuplicateDetector) built on it.

pub mod inbound;

pub use inbound::MessageOrderingApi;
