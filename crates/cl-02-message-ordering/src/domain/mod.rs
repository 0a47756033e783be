//! Ordering domain: queue, partition counters, outcomes and errors

pub mod errors;
pub mod partitions;
pub mod queue;

use serde::{Deserialize, Serialize};

pub use errors::OrderingError;
pub use partitions::PartitionCounters;
pub use queue::SequencedQueue;
pub use shared_types::{MessageStatus, OrderedMessage, ProcessingStats};

/// Result of `enqueue_message`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnqueueOutcome {
    /// Sequenced and queued
    Enqueued {
        global_sequence: u64,
        local_sequence: u64,
    },
    /// Already processed; dropped
    Duplicate,
}

/// Result of `mark_message_failed`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureOutcome {
    /// Back in the queue as PENDING
    Requeued {
        retry_count: u32,
        global_sequence: u64,
    },
    /// Retry budget exhausted; appended to the dead-letter list
    DeadLettered,
}
