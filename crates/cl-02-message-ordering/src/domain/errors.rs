//! Error types for message ordering

use shared_types::{CodecError, MessageStatus, StoreError};
use thiserror::Error;

/// All errors that can occur in message ordering
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderingError {
    /// Shared store failure (sequence counter, dedup keys, dead-letter list)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Dead-letter record could not be serialized
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The requested status change is not an edge of the lifecycle
    #[error("Message {id}: illegal transition {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: MessageStatus,
        to: MessageStatus,
    },

    /// Queue at capacity
    #[error("Queue full: capacity {capacity}")]
    QueueFull { capacity: usize },
}
