//! Inbound Port (Driving Port / API)

use async_trait::async_trait;

use crate::domain::{EnqueueOutcome, FailureOutcome, OrderedMessage, OrderingError, ProcessingStats};

/// Primary message ordering API
///
/// ```text
/// producer: enqueue_message ─→ duplicate check ─→ assign_sequence ─→ queue
/// consumer: dequeue_message ─→ process ─→ mark_message_processed
///                                      └─→ mark_message_failed ─→ retry | dead letter
/// ```
#[async_trait]
pub trait MessageOrderingApi: Send + Sync {
    /// Assign global and local sequences to `message`.
    ///
    /// Returns `(global_sequence, local_sequence)`.
    async fn assign_sequence(
        &self,
        message: &mut OrderedMessage,
    ) -> Result<(u64, u64), OrderingError>;

    /// Filter duplicates, sequence, and queue a PENDING message.
    ///
    /// # Errors
    /// - `InvalidTransition`: the message is not PENDING
    /// - `QueueFull`: the queue is at capacity
    /// - `Store`: the duplicate check or counter increment failed
    async fn enqueue_message(&self, message: OrderedMessage)
        -> Result<EnqueueOutcome, OrderingError>;

    /// Take the lowest-sequenced message, waiting briefly on an empty queue.
    ///
    /// The returned message is PROCESSING.
    async fn dequeue_message(&self) -> Option<OrderedMessage>;

    /// PROCESSING → COMPLETED, and remember the id as processed.
    async fn mark_message_processed(&self, message: &mut OrderedMessage)
        -> Result<(), OrderingError>;

    /// PROCESSING → FAILED, then retry or dead-letter.
    async fn mark_message_failed(
        &self,
        message: &mut OrderedMessage,
        reason: &str,
    ) -> Result<FailureOutcome, OrderingError>;

    /// Counters, sequence, partition count and queue depth.
    fn get_stats(&self) -> ProcessingStats;
}
