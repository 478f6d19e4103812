/// Number of samples kept per history trace.
pub const DEFAULT_HISTORY_CAPACITY: usize = 75;

/// Fixed-capacity sliding window over scalar samples.
///
/// Appending to a full window drops the oldest sample. Storage is a ring with a
/// wrap-around write index, so `append` is O(1) while `snapshot` still returns
/// samples oldest to newest.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    samples: Vec<f32>,
    capacity: usize,
    /// Slot the next append writes to.
    head: usize,
}

impl HistoryBuffer {
    /// Creates an empty window holding at most `capacity` samples.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be non-zero");
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    pub fn append(&mut self, sample: f32) {
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
        } else {
            self.samples[self.head] = sample;
        }
        self.head = (self.head + 1) % self.capacity;
    }

    /// Samples in chronological order.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        let split = if self.samples.len() < self.capacity { 0 } else { self.head };
        let (newer, older) = self.samples.split_at(split);
        older.iter().chain(newer.iter()).copied()
    }

    pub fn snapshot(&self) -> Vec<f32> {
        self.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.head = 0;
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_tracks_appends_until_full() {
        let mut history = HistoryBuffer::new(4);
        assert!(history.is_empty());
        for n in 0..10 {
            history.append(n as f32);
            assert_eq!(history.len(), (n + 1).min(4));
        }
        assert_eq!(history.capacity(), 4);
    }

    #[test]
    fn partial_window_keeps_append_order() {
        let mut history = HistoryBuffer::new(5);
        history.append(1.0);
        history.append(2.0);
        history.append(3.0);
        assert_eq!(history.snapshot(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn full_window_holds_last_capacity_values() {
        let mut history = HistoryBuffer::default();
        let total = DEFAULT_HISTORY_CAPACITY * 2 + 17;
        for n in 0..total {
            history.append(n as f32);
        }
        let expected: Vec<f32> = (total - DEFAULT_HISTORY_CAPACITY..total)
            .map(|n| n as f32)
            .collect();
        assert_eq!(history.snapshot(), expected);
    }

    #[test]
    fn wrap_exactly_at_capacity() {
        let mut history = HistoryBuffer::new(3);
        for v in [1.0, 2.0, 3.0] {
            history.append(v);
        }
        assert_eq!(history.snapshot(), vec![1.0, 2.0, 3.0]);
        history.append(4.0);
        assert_eq!(history.snapshot(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn clear_empties_the_window() {
        let mut history = HistoryBuffer::new(2);
        history.append(1.0);
        history.append(2.0);
        history.append(3.0);
        history.clear();
        assert!(history.is_empty());
        history.append(9.0);
        assert_eq!(history.snapshot(), vec![9.0]);
    }

    #[test]
    #[should_panic]
    fn zero_capacity_is_rejected() {
        let _ = HistoryBuffer::new(0);
    }
}
