//! Message Ordering Service
//!
//! Main service implementing [`MessageOrderingApi`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use shared_bus::DuplicateDetector;
use shared_store::CoordinationStore;
use shared_types::channels::{partition_sequence_key, DEAD_LETTER_QUEUE_KEY, GLOBAL_SEQUENCE_KEY};
use shared_types::Envelope;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::{OrderingConfig, PartitionScope, RetrySequencing};
use crate::domain::{
    EnqueueOutcome, FailureOutcome, MessageStatus, OrderedMessage, OrderingError,
    PartitionCounters, ProcessingStats, SequencedQueue,
};
use crate::ports::inbound::MessageOrderingApi;

#[derive(Default)]
struct Counters {
    total: AtomicU64,
    processed: AtomicU64,
    duplicates: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    last_global_sequence: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn check_transition(message: &OrderedMessage, to: MessageStatus) -> Result<(), OrderingError> {
    if message.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(OrderingError::InvalidTransition {
            id: message.id().to_string(),
            from: message.status,
            to,
        })
    }
}

/// Message Ordering Manager
///
/// Orchestrates the lifecycle:
/// 1. Duplicate check against the two-tier detector
/// 2. Global sequence from the shared counter, local sequence per partition
/// 3. Bounded queue ordered by global sequence
/// 4. Completion recorded in the detector; failures retried until the
///    budget is spent, then appended to the dead-letter list
pub struct MessageOrderingManager {
    store: Arc<dyn CoordinationStore>,
    dedup: Arc<DuplicateDetector>,
    config: OrderingConfig,
    queue: Mutex<SequencedQueue>,
    partitions: Mutex<PartitionCounters>,
    available: Notify,
    counters: Counters,
}

impl MessageOrderingManager {
    /// Create a manager over the shared store and a duplicate detector
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        dedup: Arc<DuplicateDetector>,
        config: OrderingConfig,
    ) -> Self {
        Self {
            queue: Mutex::new(SequencedQueue::new(config.max_queue_size)),
            partitions: Mutex::new(PartitionCounters::new()),
            available: Notify::new(),
            counters: Counters::default(),
            store,
            dedup,
            config,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &OrderingConfig {
        &self.config
    }

    /// Wrap an envelope as a PENDING message carrying the configured retry budget
    pub fn prepare(&self, envelope: Envelope, partition_key: impl Into<String>) -> OrderedMessage {
        OrderedMessage::new(envelope, partition_key, self.config.max_retries)
    }

    /// Messages currently queued
    pub fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    /// Drop expired entries from the detector's local tier
    pub fn clear_expired(&self) -> usize {
        self.dedup.clear_expired()
    }

    /// Read back the dead-letter list, oldest first.
    ///
    /// Records that no longer parse are skipped with a warning.
    pub async fn dead_letters(&self) -> Result<Vec<OrderedMessage>, OrderingError> {
        let raw = self.store.list_range(DEAD_LETTER_QUEUE_KEY).await?;
        Ok(raw
            .iter()
            .filter_map(|record| match OrderedMessage::decode(record) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable dead-letter record");
                    None
                }
            })
            .collect())
    }

    async fn next_local_sequence(&self, partition_key: &str) -> Result<u64, OrderingError> {
        match self.config.partition_scope {
            PartitionScope::Process => Ok(self.partitions.lock().next(partition_key)),
            PartitionScope::Shared => {
                let local = self
                    .store
                    .incr(&partition_sequence_key(partition_key))
                    .await?;
                self.partitions.lock().observe(partition_key, local);
                Ok(local)
            }
        }
    }

    fn pop(&self) -> Option<OrderedMessage> {
        let mut message = self.queue.lock().pop()?;
        message.status = MessageStatus::Processing;
        Some(message)
    }

    /// Append `failed` to the dead-letter list and return it as stored.
    async fn dead_letter(&self, failed: OrderedMessage) -> Result<OrderedMessage, OrderingError> {
        let mut record = failed;
        record.status = MessageStatus::DeadLetter;
        let encoded = record.encode()?;
        self.store
            .list_append(DEAD_LETTER_QUEUE_KEY, &encoded)
            .await?;

        warn!(
            id = %record.id(),
            partition_key = %record.partition_key,
            retry_count = record.retry_count,
            reason = record.failed_reason.as_deref().unwrap_or_default(),
            "Retry budget exhausted, message dead-lettered"
        );
        Ok(record)
    }

    /// Put `failed` back in the queue as PENDING and return it as queued.
    async fn requeue(&self, failed: OrderedMessage) -> Result<OrderedMessage, OrderingError> {
        let mut retry = failed;
        retry.status = MessageStatus::Pending;
        if self.config.retry_sequencing == RetrySequencing::Resequence {
            self.assign_sequence(&mut retry).await?;
        }
        self.queue.lock().requeue(retry.clone());
        self.available.notify_one();

        debug!(
            id = %retry.id(),
            retry_count = retry.retry_count,
            global_sequence = retry.global_sequence,
            "Message re-queued for retry"
        );
        Ok(retry)
    }
}

#[async_trait]
impl MessageOrderingApi for MessageOrderingManager {
    async fn assign_sequence(
        &self,
        message: &mut OrderedMessage,
    ) -> Result<(u64, u64), OrderingError> {
        let global = self.store.incr(GLOBAL_SEQUENCE_KEY).await?;
        let local = self.next_local_sequence(&message.partition_key).await?;

        message.global_sequence = global;
        message.local_sequence = local;
        self.counters
            .last_global_sequence
            .fetch_max(global, Ordering::Relaxed);
        Ok((global, local))
    }

    async fn enqueue_message(
        &self,
        mut message: OrderedMessage,
    ) -> Result<EnqueueOutcome, OrderingError> {
        if message.status != MessageStatus::Pending {
            return Err(OrderingError::InvalidTransition {
                id: message.id().to_string(),
                from: message.status,
                to: MessageStatus::Pending,
            });
        }

        if self.dedup.is_duplicate(message.id()).await? {
            bump(&self.counters.duplicates);
            debug!(id = %message.id(), "Duplicate message dropped");
            return Ok(EnqueueOutcome::Duplicate);
        }

        // The slot is held across sequencing so a full queue never burns a
        // global sequence.
        self.queue.lock().reserve()?;
        let (global_sequence, local_sequence) = match self.assign_sequence(&mut message).await {
            Ok(sequences) => sequences,
            Err(e) => {
                self.queue.lock().cancel();
                return Err(e);
            }
        };
        let id = message.id().to_string();
        let partition_key = message.partition_key.clone();
        self.queue.lock().fill(message);
        self.available.notify_one();
        bump(&self.counters.total);

        debug!(
            %id,
            %partition_key,
            global_sequence,
            local_sequence,
            "Message enqueued"
        );
        Ok(EnqueueOutcome::Enqueued {
            global_sequence,
            local_sequence,
        })
    }

    async fn dequeue_message(&self) -> Option<OrderedMessage> {
        let wait = async {
            loop {
                let notified = self.available.notified();
                if let Some(message) = self.pop() {
                    return message;
                }
                notified.await;
            }
        };
        tokio::time::timeout(self.config.dequeue_wait, wait).await.ok()
    }

    async fn mark_message_processed(
        &self,
        message: &mut OrderedMessage,
    ) -> Result<(), OrderingError> {
        check_transition(message, MessageStatus::Completed)?;
        self.dedup.mark_processed(message.id()).await?;

        message.status = MessageStatus::Completed;
        message.processed_at = Some(Utc::now());
        bump(&self.counters.processed);
        debug!(id = %message.id(), global_sequence = message.global_sequence, "Message processed");
        Ok(())
    }

    async fn mark_message_failed(
        &self,
        message: &mut OrderedMessage,
        reason: &str,
    ) -> Result<FailureOutcome, OrderingError> {
        check_transition(message, MessageStatus::Failed)?;

        // Work on a copy: on error the caller keeps a PROCESSING message it
        // can fail again.
        let mut failed = message.clone();
        failed.status = MessageStatus::Failed;
        failed.retry_count = failed.retry_count.saturating_add(1);
        failed.failed_reason = Some(reason.to_string());
        info!(
            id = %failed.id(),
            retry_count = failed.retry_count,
            max_retries = failed.max_retries,
            %reason,
            "Message processing failed"
        );

        let exhausted = failed.retry_count > failed.max_retries;
        let settled = if exhausted {
            self.dead_letter(failed).await
        } else {
            self.requeue(failed).await
        }
        .inspect_err(|e| {
            warn!(id = %message.id(), error = %e, "Failure not recorded, message left in processing");
        })?;

        *message = settled;
        bump(&self.counters.failed);
        if exhausted {
            bump(&self.counters.dead_lettered);
            Ok(FailureOutcome::DeadLettered)
        } else {
            bump(&self.counters.retried);
            Ok(FailureOutcome::Requeued {
                retry_count: message.retry_count,
                global_sequence: message.global_sequence,
            })
        }
    }

    fn get_stats(&self) -> ProcessingStats {
        let c = &self.counters;
        ProcessingStats {
            total: c.total.load(Ordering::Relaxed),
            processed: c.processed.load(Ordering::Relaxed),
            duplicates: c.duplicates.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            retried: c.retried.load(Ordering::Relaxed),
            dead_lettered: c.dead_lettered.load(Ordering::Relaxed),
            current_global_sequence: c.last_global_sequence.load(Ordering::Relaxed),
            partition_count: self.partitions.lock().count(),
            queue_depth: self.queue.lock().len(),
        }
    }
}
