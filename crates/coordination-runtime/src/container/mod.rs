//! # Coordination Container
//!
//! Configuration and the per-process component context.

pub mod config;
pub mod context;

pub use config::{generate_node_id, Backend, ConfigError, RuntimeConfig};
pub use context::{CoordinationContext, StartupError};
