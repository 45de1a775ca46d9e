//! Fixed-capacity FIFO journal.

use std::collections::VecDeque;

/// Default number of records kept per REST journal.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 25;

/// Append-only ring buffer that drops its oldest record on overflow.
#[derive(Debug, Clone, PartialEq)]
pub struct Journal<T> {
    capacity: usize,
    records: VecDeque<T>,
}

impl<T: Clone> Journal<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: VecDeque::new(),
        }
    }

    /// Build a journal from existing records, keeping only the newest `capacity`.
    pub fn from_records(capacity: usize, records: impl IntoIterator<Item = T>) -> Self {
        let mut journal = Self::new(capacity);
        for record in records {
            journal.push(record);
        }
        journal
    }

    /// Append a record, returning the one that was dropped to make room.
    pub fn push(&mut self, record: T) -> Option<T> {
        let dropped = if self.records.len() >= self.capacity {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(record);
        dropped
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

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.iter()
    }

    /// Owned copy in chronological order, limited to the newest `limit` records.
    pub fn to_vec(&self, limit: Option<usize>) -> Vec<T> {
        let skip = match limit {
            Some(limit) if limit > 0 => self.records.len().saturating_sub(limit),
            _ => 0,
        };
        self.records.iter().skip(skip).cloned().collect()
    }
}
