//! Per-partition local sequence counters.

use std::collections::HashMap;

/// Last local sequence handed out per partition key.
#[derive(Debug, Default)]
pub struct PartitionCounters {
    counters: HashMap<String, u64>,
}

impl PartitionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next local sequence for `partition_key`, starting at 1.
    pub fn next(&mut self, partition_key: &str) -> u64 {
        let counter = self.counters.entry(partition_key.to_string()).or_insert(0);
        *counter = counter.saturating_add(1);
        *counter
    }

    /// Record a sequence assigned elsewhere (shared counters).
    pub fn observe(&mut self, partition_key: &str, sequence: u64) {
        let counter = self.counters.entry(partition_key.to_string()).or_insert(0);
        *counter = (*counter).max(sequence);
    }

    /// Distinct partitions seen.
    pub fn count(&self) -> usize {
        self.counters.len()
    }
}
