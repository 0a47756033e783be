//! # Message Envelope
//!
//! The wire object exchanged over the pub/sub transport.
//!
//! ## Wire Format
//!
//! ```text
//! {
//!   "id": "7b0c…",                      // unique, sole idempotency key
//!   "channel": "cache:invalidate:AAPL",
//!   "message_type": "cache_invalidation",
//!   "timestamp": "2026-10-16T09:30:00Z", // ISO-8601
//!   "data": { ... },                     // JSON object
//!   "source_server": "worker-3-1a2b3c4d",
//!   "priority": 3                        // 1 (lowest) ..= 5 (highest)
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CodecError;

/// Delivery priority carried by an envelope (1–5).
///
/// The ordering manager sequences strictly by global sequence; priority is
/// informational for consumers and survives the wire unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    /// Lowest priority.
    pub const LOWEST: Priority = Priority(1);
    /// Below normal.
    pub const LOW: Priority = Priority(2);
    /// Default priority.
    pub const NORMAL: Priority = Priority(3);
    /// Above normal.
    pub const HIGH: Priority = Priority(4);
    /// Highest priority.
    pub const HIGHEST: Priority = Priority(5);

    /// Build a priority, rejecting values outside `1..=5`.
    pub fn new(value: u8) -> Result<Self, CodecError> {
        if (1..=5).contains(&value) {
            Ok(Self(value))
        } else {
            Err(CodecError::InvalidPriority(value))
        }
    }

    /// Numeric value.
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl TryFrom<u8> for Priority {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

/// A broadcast message.
///
/// Created by a publisher; never persisted beyond transport delivery unless
/// it is wrapped into an [`OrderedMessage`](crate::OrderedMessage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique message identifier.
    pub id: String,
    /// Channel the envelope was published on.
    pub channel: String,
    /// Application-level message kind.
    pub message_type: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Application payload (always a JSON object on the wire).
    #[serde(rename = "data")]
    pub payload: serde_json::Value,
    /// Identity of the publishing process. Stamped by the broker.
    #[serde(rename = "source_server", default)]
    pub source: String,
    /// Delivery priority.
    #[serde(default)]
    pub priority: Priority,
}

impl Envelope {
    /// Create an envelope with a fresh id and the current timestamp.
    pub fn new(
        channel: impl Into<String>,
        message_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel: channel.into(),
            message_type: message_type.into(),
            timestamp: Utc::now(),
            payload,
            source: String::new(),
            priority: Priority::default(),
        }
    }

    /// Replace the generated id (for producers with their own idempotency keys).
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the delivery priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the source identity.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Serialize to the JSON wire format.
    pub fn encode(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the JSON wire format.
    ///
    /// # Errors
    ///
    /// - `CodecError::Malformed` - not valid JSON or missing fields
    /// - `CodecError::InvalidPriority` - priority outside `1..=5`
    /// - `CodecError::InvalidPayload` - `data` is not a JSON object
    pub fn decode(raw: &str) -> Result<Self, CodecError> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        if !envelope.payload.is_object() {
            return Err(CodecError::InvalidPayload(format!(
                "expected object, got {}",
                json_kind(&envelope.payload)
            )));
        }
        if envelope.id.is_empty() {
            return Err(CodecError::Malformed("empty envelope id".to_string()));
        }
        Ok(envelope)
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
