//! Fixed-capacity ring buffer used for every telemetry history column.

use serde::{Serialize, Serializer};
use std::collections::VecDeque;

/// Ordered history that keeps only the most recent `capacity` values.
///
/// Values are appended at the tail; once the buffer is full the oldest value
/// is evicted from the head. An unbounded ring never evicts.
#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: Option<usize>,
}

impl<T> RingBuffer<T> {
    /// Creates a ring holding at most `capacity` values (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity: Some(capacity),
        }
    }

    /// Creates a ring that never evicts, for full-history replay.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            items: VecDeque::new(),
            capacity: None,
        }
    }

    /// Appends a value, returning the evicted oldest value if the ring was full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = match self.capacity {
            Some(capacity) if self.items.len() >= capacity => self.items.pop_front(),
            _ => None,
        };
        self.items.push_back(value);
        evicted
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Oldest-first iterator
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Most recently pushed value
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copies the contents, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<T: Serialize> Serialize for RingBuffer<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.items.iter())
    }
}
