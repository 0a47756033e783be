//! Bounded queue ordered ascending by global sequence.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use shared_types::OrderedMessage;

use super::errors::OrderingError;

/// Heap entry: reversed so the lowest global sequence pops first.
#[derive(Debug)]
struct Entry(OrderedMessage);

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .global_sequence
            .cmp(&self.0.global_sequence)
            .then_with(|| other.0.local_sequence.cmp(&self.0.local_sequence))
    }
}

/// Messages waiting for a consumer.
///
/// Fresh messages take a slot with [`reserve`](Self::reserve) before they are
/// sequenced and fill it with [`fill`](Self::fill) afterwards, so a reserved
/// slot counts against capacity. Retries go back through
/// [`requeue`](Self::requeue) and are never refused.
#[derive(Debug)]
pub struct SequencedQueue {
    heap: BinaryHeap<Entry>,
    reserved: usize,
    capacity: usize,
}

impl SequencedQueue {
    /// Empty queue holding at most `capacity` fresh messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            reserved: 0,
            capacity,
        }
    }

    /// Claim a slot for a message about to be sequenced.
    ///
    /// # Errors
    /// - `QueueFull`: queued plus reserved messages reach capacity
    pub fn reserve(&mut self) -> Result<(), OrderingError> {
        if self.is_full() {
            return Err(OrderingError::QueueFull {
                capacity: self.capacity,
            });
        }
        self.reserved += 1;
        Ok(())
    }

    /// Give back a slot whose message never got sequenced.
    pub fn cancel(&mut self) {
        self.reserved = self.reserved.saturating_sub(1);
    }

    /// Insert a sequenced message into a previously reserved slot.
    pub fn fill(&mut self, message: OrderedMessage) {
        self.reserved = self.reserved.saturating_sub(1);
        self.heap.push(Entry(message));
    }

    /// Put a failed message back, ignoring capacity.
    ///
    /// The message already held a slot before it was dequeued.
    pub fn requeue(&mut self, message: OrderedMessage) {
        self.heap.push(Entry(message));
    }

    /// Remove the message with the lowest global sequence.
    pub fn pop(&mut self) -> Option<OrderedMessage> {
        self.heap.pop().map(|entry| entry.0)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() + self.reserved >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_types::Envelope;

    fn sequenced(global: u64) -> OrderedMessage {
        let mut message =
            OrderedMessage::new(Envelope::new("orders", "fill", json!({})), "AAPL", 3);
        message.global_sequence = global;
        message.local_sequence = global;
        message
    }

    fn push(queue: &mut SequencedQueue, global: u64) -> Result<(), OrderingError> {
        queue.reserve()?;
        queue.fill(sequenced(global));
        Ok(())
    }

    #[test]
    fn test_pops_lowest_sequence_first() {
        let mut queue = SequencedQueue::new(10);
        for global in [5, 1, 9, 3] {
            push(&mut queue, global).unwrap();
        }

        let order: Vec<_> = std::iter::from_fn(|| queue.pop())
            .map(|m| m.global_sequence)
            .collect();
        assert_eq!(order, vec![1, 3, 5, 9]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_bounded() {
        let mut queue = SequencedQueue::new(2);
        push(&mut queue, 1).unwrap();
        push(&mut queue, 2).unwrap();
        assert!(queue.is_full());
        assert_eq!(
            push(&mut queue, 3),
            Err(OrderingError::QueueFull { capacity: 2 })
        );
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_reservation_counts_against_capacity() {
        let mut queue = SequencedQueue::new(2);
        queue.reserve().unwrap();
        queue.reserve().unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.reserve(), Err(OrderingError::QueueFull { capacity: 2 }));

        queue.cancel();
        queue.fill(sequenced(1));
        assert_eq!(queue.len(), 1);
        assert!(queue.is_full());
    }

    #[test]
    fn test_requeue_ignores_capacity() {
        let mut queue = SequencedQueue::new(1);
        push(&mut queue, 2).unwrap();
        queue.requeue(sequenced(1));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().map(|m| m.global_sequence), Some(1));
    }
}
