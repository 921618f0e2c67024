//! Fixed-capacity window of recent request outcomes

use std::collections::VecDeque;

/// FIFO of error/ok outcomes for the most recent `capacity` requests
#[derive(Debug, Clone)]
pub struct OutcomeWindow {
    outcomes: VecDeque<bool>,
    capacity: usize,
    /// Number of `true` entries currently in `outcomes`
    error_count: usize,
}

impl OutcomeWindow {
    /// Create an empty window. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            outcomes: VecDeque::with_capacity(capacity),
            capacity,
            error_count: 0,
        }
    }

    /// Append an outcome, evicting the oldest one once the window is full
    pub fn push(&mut self, is_error: bool) {
        if self.outcomes.len() == self.capacity {
            if let Some(true) = self.outcomes.pop_front() {
                self.error_count -= 1;
            }
        }
        self.outcomes.push_back(is_error);
        if is_error {
            self.error_count += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.outcomes.len() == self.capacity
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Error percentage over the window, only once it is full
    pub fn error_rate(&self) -> Option<f64> {
        if !self.is_full() {
            return None;
        }
        Some(self.error_count as f64 / self.capacity as f64 * 100.0)
    }

    /// Outcomes from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.outcomes.iter().copied()
    }
}
