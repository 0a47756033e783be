//! # Coordination Runtime Library
//!
//! Exposes the runtime pieces for embedding and tests. The binary entry
//! point is `main.rs`.
//!
//! - [`RuntimeConfig`]: `CL_*` environment configuration
//! - [`CoordinationContext`]: explicit per-process component handle
//! - [`CoordinationRuntime`]: background tasks and graceful shutdown
//! - [`admin`]: `/health` and `/metrics` on the metrics port

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod admin;
pub mod container;
pub mod runtime;

pub use container::{
    Backend, ConfigError, CoordinationContext, RuntimeConfig, StartupError,
};
pub use runtime::CoordinationRuntime;
