//! Fixed-capacity pre-trip history.
//!
//! Records are stored newest-first: index 0 is the most recent push and the
//! tail is the oldest. When full, a push evicts the tail. [`RingBuffer::flush`]
//! hands everything back oldest-first and leaves the buffer empty.

use crate::record::BufferedRecord;
use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 25;

#[derive(Debug, Clone)]
pub struct RingBuffer {
    records: VecDeque<BufferedRecord>,
    capacity: usize,
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RingBuffer {
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert at the head, returning the evicted oldest record if the
    /// buffer was full.
    pub fn push(&mut self, record: BufferedRecord) -> Option<BufferedRecord> {
        let evicted = if self.records.len() == self.capacity {
            self.records.pop_back()
        } else {
            None
        };
        self.records.push_front(record);
        evicted
    }

    /// Drain all records in chronological (oldest-first) order.
    pub fn flush(&mut self) -> Vec<BufferedRecord> {
        let mut out: Vec<BufferedRecord> = self.records.drain(..).collect();
        out.reverse();
        out
    }

    /// Drop everything without returning it.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Change capacity. Shrinking evicts from the tail; the evicted records
    /// are returned oldest-first.
    pub fn resize(&mut self, capacity: usize) -> Vec<BufferedRecord> {
        self.capacity = capacity.max(1);
        let mut evicted = Vec::new();
        while self.records.len() > self.capacity {
            if let Some(r) = self.records.pop_back() {
                evicted.push(r);
            }
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
