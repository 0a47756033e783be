//! # Shared Types Crate
//!
//! Types exchanged between the components of the coordination layer.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: Envelope, ordered-message, lock and stats
//!   types are defined once here and reused by the broker, the lock manager
//!   and the ordering manager.
//! - **Envelope Identity**: The envelope `id` is the sole idempotency key.
//! - **Stable Key Space**: Every shared-store key the layer touches is built
//!   through the helpers in [`channels`], never with ad-hoc `format!` calls.

pub mod channels;
pub mod entities;
pub mod envelope;
pub mod errors;

pub use channels::{ChannelPattern, ChannelTemplate};
pub use entities::*;
pub use envelope::{Envelope, Priority};
pub use errors::*;
