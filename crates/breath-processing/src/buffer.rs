//! Append-only sample history with parallel index sequence

use std::collections::VecDeque;

/// Ordered values and their sample indices.
///
/// Unbounded by default. With a capacity the oldest entries are dropped
/// once it is exceeded.
#[derive(Debug, Clone, Default)]
pub struct SignalBuffer {
    values: VecDeque<f64>,
    indices: VecDeque<u64>,
    capacity: Option<usize>,
    dropped: u64,
}

impl SignalBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_limit(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn push(&mut self, index: u64, value: f64) {
        self.values.push_back(value);
        self.indices.push_back(index);
        if let Some(capacity) = self.capacity {
            while self.values.len() > capacity {
                self.values.pop_front();
                self.indices.pop_front();
                self.dropped += 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values as one contiguous slice
    pub fn values(&mut self) -> &[f64] {
        self.values.make_contiguous()
    }

    /// Sample indices as one contiguous slice
    pub fn indices(&mut self) -> &[u64] {
        self.indices.make_contiguous()
    }

    /// Most recent `count` values, oldest first
    pub fn tail(&self, count: usize) -> Vec<f64> {
        let skip = self.values.len().saturating_sub(count);
        self.values.iter().skip(skip).copied().collect()
    }

    pub fn latest(&self) -> Option<(u64, f64)> {
        Some((*self.indices.back()?, *self.values.back()?))
    }

    /// Entries evicted by the capacity limit
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
