//! Bounded telemetry history.
//!
//! Keeps the most recent sensor lines in arrival order, oldest first.
//! Once full, every new entry evicts exactly the oldest one.

use std::collections::VecDeque;

use crate::constants::DEFAULT_HISTORY_CAPACITY;

/// Fixed-capacity FIFO of sensor lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryHistory {
    capacity: usize,
    entries: VecDeque<String>,
}

impl Default for TelemetryHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl TelemetryHistory {
    /// Create an empty history. A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a line, evicting the oldest entry if the history is full.
    ///
    /// Returns the updated snapshot, oldest first.
    pub fn record(&mut self, line: impl Into<String>) -> &[String] {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line.into());
        self.entries.make_contiguous()
    }

    /// Fixed-size view: recorded lines in order, `None` for unfilled slots.
    pub fn slots(&self) -> Vec<Option<&str>> {
        let mut slots: Vec<Option<&str>> = self.entries.iter().map(|s| Some(s.as_str())).collect();
        slots.resize(self.capacity, None);
        slots
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &str> + ExactSizeIterator {
        self.entries.iter().map(String::as_str)
    }

    /// Owned copy of the entries, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    /// Most recently recorded line.
    pub fn latest(&self) -> Option<&str> {
        self.entries.back().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
