//! # Error Types
//!
//! Errors shared across the coordination components. Component-specific
//! outcomes (lock timeouts, ownership mismatches, retry exhaustion) live in
//! their own crates.

use thiserror::Error;

/// Errors raised by a shared coordination store adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("Store connection failed: {0}")]
    Connection(String),

    /// A store command failed.
    #[error("Store command {command} failed: {reason}")]
    Command { command: String, reason: String },

    /// A key held a value of an unexpected shape.
    #[error("Unexpected value at key {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl StoreError {
    /// Shorthand for a failed command.
    pub fn command(command: &str, reason: impl ToString) -> Self {
        Self::Command {
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised by a pub/sub transport adapter.
///
/// The broker catches and counts these; they never reach publish/subscribe
/// callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection dropped.
    #[error("Transport connection lost: {0}")]
    ConnectionLost(String),

    /// The transport has been closed and will not deliver again.
    #[error("Transport closed")]
    Closed,

    /// An operation did not complete in time.
    #[error("Transport {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// A transport command was rejected.
    #[error("Transport command failed: {0}")]
    Command(String),
}

/// Serialization errors for envelopes and ordered messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The payload could not be parsed.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Priority outside `1..=5`.
    #[error("Invalid priority {0}: must be within 1..=5")]
    InvalidPriority(u8),

    /// The `data` field has the wrong shape.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Errors building channel names or patterns.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The glob pattern failed to compile.
    #[error("Invalid channel pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A template segment had no value.
    #[error("Channel template {template} is missing a value for {{{segment}}}")]
    MissingSegment { template: String, segment: String },

    /// A value contained glob metacharacters.
    #[error("Value for {{{segment}}} must not contain '*', '?' or '[' (got {value})")]
    GlobInValue { segment: String, value: String },
}
