//! # Coordination Entities
//!
//! Ordered messages and their lifecycle, distributed lock records, and the
//! processing statistics snapshot.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channels;
use crate::envelope::Envelope;
use crate::errors::CodecError;

// =============================================================================
// ORDERED MESSAGES
// =============================================================================

/// Lifecycle status of an [`OrderedMessage`].
///
/// ```text
/// [PENDING] ──dequeue──→ [PROCESSING] ──processed──→ [COMPLETED]
///     ↑                        │
///     │                        └──failed──→ [FAILED] ──exhausted──→ [DEAD_LETTER]
///     │                                        │
///     └────────────────retry───────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    /// Waiting in the queue.
    #[default]
    Pending,
    /// Handed to a consumer.
    Processing,
    /// Processed successfully. Terminal.
    Completed,
    /// Processing failed; about to be retried or dead-lettered.
    Failed,
    /// Retry budget exhausted. Terminal.
    DeadLetter,
}

impl MessageStatus {
    /// Whether no further transition is allowed.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::DeadLetter)
    }

    /// Whether `self → next` is a legal edge of the lifecycle.
    #[must_use]
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        use MessageStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Pending)
                | (Failed, DeadLetter)
        )
    }

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::DeadLetter => "DEAD_LETTER",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An envelope owned by the ordering manager from enqueue until a terminal
/// state.
///
/// INVARIANT: `global_sequence` is assigned exactly once per enqueue attempt.
/// INVARIANT: `local_sequence` is monotonic per `partition_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedMessage {
    /// The wrapped envelope (flattened on the wire).
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Position in the system-wide assignment order. `0` until sequenced.
    pub global_sequence: u64,
    /// Position within `partition_key`. `0` until sequenced.
    pub local_sequence: u64,
    /// Caller-chosen partition (e.g. a ticker symbol or user id).
    pub partition_key: String,
    /// Lifecycle status.
    pub status: MessageStatus,
    /// Failures recorded so far.
    pub retry_count: u32,
    /// Retries allowed before dead-lettering.
    pub max_retries: u32,
    /// When the message first entered the ordering manager.
    pub created_at: DateTime<Utc>,
    /// When the message completed.
    pub processed_at: Option<DateTime<Utc>>,
    /// Reason given by the last failure.
    pub failed_reason: Option<String>,
}

impl OrderedMessage {
    /// Wrap an envelope for ordered processing.
    pub fn new(envelope: Envelope, partition_key: impl Into<String>, max_retries: u32) -> Self {
        Self {
            envelope,
            global_sequence: 0,
            local_sequence: 0,
            partition_key: partition_key.into(),
            status: MessageStatus::Pending,
            retry_count: 0,
            max_retries,
            created_at: Utc::now(),
            processed_at: None,
            failed_reason: None,
        }
    }

    /// The idempotency key.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.envelope.id
    }

    /// Whether sequences have been assigned.
    #[must_use]
    pub fn is_sequenced(&self) -> bool {
        self.global_sequence > 0
    }

    /// Serialize to JSON (dead-letter record format).
    pub fn encode(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a dead-letter record.
    pub fn decode(raw: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(raw)?)
    }
}

// =============================================================================
// DISTRIBUTED LOCKS
// =============================================================================

/// A held lock on a named resource.
///
/// Owned by whoever wrote the set-if-absent key; released explicitly or
/// reclaimed by the store's TTL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributedLock {
    /// Locked resource name.
    pub resource_id: String,
    /// Opaque ownership proof stored at `lock:{resource_id}`.
    pub token: String,
    /// Human-readable holder identity.
    pub owner: String,
    /// Acquisition time.
    pub acquired_at: DateTime<Utc>,
    /// Time-to-live currently applied to the key.
    pub ttl: Duration,
    /// Expected expiry of the key.
    pub expires_at: DateTime<Utc>,
}

impl DistributedLock {
    /// Record a freshly acquired lock.
    pub fn new(
        resource_id: impl Into<String>,
        token: impl Into<String>,
        owner: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let acquired_at = Utc::now();
        Self {
            resource_id: resource_id.into(),
            token: token.into(),
            owner: owner.into(),
            acquired_at,
            ttl,
            expires_at: expiry_after(acquired_at, ttl),
        }
    }

    /// Store key for this lock.
    #[must_use]
    pub fn key(&self) -> String {
        channels::lock_key(&self.resource_id)
    }

    /// Whether the local record says the lock has expired.
    ///
    /// Advisory only: the store's TTL is authoritative.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Time left according to the local record.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

/// `start + ttl`, saturating at the largest representable instant.
#[must_use]
pub fn expiry_after(start: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|delta| start.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Read-only processing snapshot, recomputed on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStats {
    /// Messages accepted into the queue (first attempts only).
    pub total: u64,
    /// Messages completed.
    pub processed: u64,
    /// Messages rejected as duplicates.
    pub duplicates: u64,
    /// Failure reports received.
    pub failed: u64,
    /// Failures that were re-enqueued.
    pub retried: u64,
    /// Messages moved to the dead-letter store.
    pub dead_lettered: u64,
    /// Last value of the shared global sequence counter.
    pub current_global_sequence: u64,
    /// Distinct partitions sequenced by this process.
    pub partition_count: usize,
    /// Messages currently queued.
    pub queue_depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_transitions() {
        use MessageStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Pending));
        assert!(Failed.can_transition_to(DeadLetter));

        assert!(!Completed.can_transition_to(Pending));
        assert!(!DeadLetter.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Pending));
    }

    #[test]
    fn test_terminal_states() {
        assert!(MessageStatus::Completed.is_terminal());
        assert!(MessageStatus::DeadLetter.is_terminal());
        assert!(!MessageStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_wire_names() {
        let raw = serde_json::to_string(&MessageStatus::DeadLetter).unwrap();
        assert_eq!(raw, "\"DEAD_LETTER\"");
        assert_eq!(MessageStatus::Processing.to_string(), "PROCESSING");
    }

    #[test]
    fn test_ordered_message_flattens_envelope() {
        let envelope = Envelope::new("orders", "fill", json!({"qty": 10})).with_id("m-1");
        let mut message = OrderedMessage::new(envelope, "AAPL", 3);
        message.global_sequence = 7;

        let raw = message.encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["id"], "m-1");
        assert_eq!(value["data"]["qty"], 10);
        assert_eq!(value["status"], "PENDING");
        assert_eq!(value["global_sequence"], 7);

        let decoded = OrderedMessage::decode(&raw).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_new_message_is_unsequenced() {
        let message = OrderedMessage::new(Envelope::new("c", "t", json!({})), "p", 3);
        assert!(!message.is_sequenced());
        assert_eq!(message.status, MessageStatus::Pending);
        assert_eq!(message.retry_count, 0);
    }

    #[test]
    fn test_lock_record() {
        let lock = DistributedLock::new("nightly-report", "tok", "worker-1", Duration::from_secs(30));
        assert_eq!(lock.key(), "lock:nightly-report");
        assert!(!lock.is_expired());
        assert!(lock.remaining() <= Duration::from_secs(30));
        assert!(lock.remaining() > Duration::from_secs(28));
    }

    #[test]
    fn test_zero_ttl_lock_is_expired() {
        let lock = DistributedLock::new("r", "t", "o", Duration::ZERO);
        assert!(lock.is_expired());
        assert_eq!(lock.remaining(), Duration::ZERO);
    }
}
