//! Bounded reading history

use std::collections::VecDeque;

/// Default number of samples kept per device
pub const DEFAULT_CAPACITY: usize = 10;

/// FIFO window of `(timestamp, value)` samples.
///
/// Holds at most `capacity` samples in arrival order; pushing onto a full
/// buffer evicts the oldest sample.
#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    samples: VecDeque<(f64, T)>,
    capacity: usize,
}

impl<T> Default for HistoryBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<T> HistoryBuffer<T> {
    /// Create an empty buffer; a capacity of zero is raised to one
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one when full
    pub fn push(&mut self, timestamp: f64, value: T) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((timestamp, value));
    }

    /// The two most recent samples as `(previous, latest)`
    #[must_use]
    pub fn last_two(&self) -> Option<(&T, &T)> {
        let n = self.samples.len();
        if n < 2 {
            return None;
        }
        Some((&self.samples[n - 2].1, &self.samples[n - 1].1))
    }
}
