//! Configuration for the message ordering manager

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where per-partition `local_sequence` counters live
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionScope {
    /// In-process counter; monotonic per partition within one process
    #[default]
    Process,
    /// Store counter `partition_sequence:{key}`; monotonic across the fleet
    Shared,
}

/// How a retried message is re-inserted into the queue
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrySequencing {
    /// Assign fresh global and local sequences (goes to the back)
    #[default]
    Resequence,
    /// Keep the original sequences (goes back to its old position)
    PreserveOriginal,
}

/// Ordering configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingConfig {
    /// Retries before a message is dead-lettered
    pub max_retries: u32,
    /// Queue bound
    pub max_queue_size: usize,
    /// How long `dequeue_message` waits on an empty queue
    pub dequeue_wait: Duration,
    /// Scope of local sequence counters
    pub partition_scope: PartitionScope,
    /// Sequencing policy for retries
    pub retry_sequencing: RetrySequencing,
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_queue_size: 10_000,
            dequeue_wait: Duration::from_millis(100),
            partition_scope: PartitionScope::Process,
            retry_sequencing: RetrySequencing::Resequence,
        }
    }
}

impl OrderingConfig {
    /// Small bounds and short waits for tests
    pub fn for_testing() -> Self {
        Self {
            max_retries: 2,
            max_queue_size: 100,
            dequeue_wait: Duration::from_millis(10),
            ..Self::default()
        }
    }
}
