//! Bounded retention of generated samples
//!
//! Once `capacity` points are held, each push evicts the oldest point in
//! O(1), unlike rebuilding the store from index 1.

use crate::store::SampleStore;
use std::collections::VecDeque;

/// Field holding sample timestamps (seconds since start)
pub const TIME_FIELD: &str = "time";

/// Field holding generated values
pub const VALUE_FIELD: &str = "value";

/// Fixed-capacity `(time, value)` ring
#[derive(Debug, Clone)]
pub struct SampleRing {
    times: VecDeque<f64>,
    values: VecDeque<f64>,
    capacity: usize,
}

impl SampleRing {
    /// A zero capacity is bumped to one so the latest sample is always kept
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            times: VecDeque::with_capacity(capacity),
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, time: f64, value: f64) {
        if self.values.len() == self.capacity {
            self.times.pop_front();
            self.values.pop_front();
        }
        self.times.push_back(time);
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the capacity, dropping the oldest points if needed
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.values.len() > self.capacity {
            self.times.pop_front();
            self.values.pop_front();
        }
    }

    pub fn latest(&self) -> Option<(f64, f64)> {
        Some((*self.times.back()?, *self.values.back()?))
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    pub fn clear(&mut self) {
        self.times.clear();
        self.values.clear();
    }

    /// Materialize as a store with `time` and `value` fields
    pub fn to_store(&self) -> SampleStore {
        let mut store = SampleStore::new();
        store.add_series(TIME_FIELD, self.times.iter().copied().collect());
        store.add_series(VALUE_FIELD, self.values.iter().copied().collect());
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest() {
        let mut ring = SampleRing::new(3);
        for i in 0..5 {
            ring.push(i as f64, i as f64 * 10.0);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.values().collect::<Vec<_>>(), vec![20.0, 30.0, 40.0]);
        assert_eq!(ring.latest(), Some((4.0, 40.0)));
    }

    #[test]
    fn test_to_store_fields() {
        let mut ring = SampleRing::new(10);
        ring.push(0.0, 1.0);
        ring.push(0.1, 2.0);
        let store = ring.to_store();
        assert_eq!(store.field_names(), [TIME_FIELD, VALUE_FIELD]);
        assert_eq!(store.series(VALUE_FIELD), [1.0, 2.0]);
        assert!(store.is_valid());
    }

    #[test]
    fn test_shrink_capacity() {
        let mut ring = SampleRing::new(5);
        for i in 0..5 {
            ring.push(i as f64, i as f64);
        }
        ring.set_capacity(2);
        assert_eq!(ring.values().collect::<Vec<_>>(), vec![3.0, 4.0]);
        assert_eq!(SampleRing::new(0).capacity(), 1);
    }
}
