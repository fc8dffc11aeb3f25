use std::collections::VecDeque;

/// Bounded FIFO of recent strength samples with a running sum.
///
/// Storage is reserved up front, so pushing never allocates once the
/// window exists. Invariant: `sum == Σ(samples)`.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    samples: VecDeque<f32>,
    capacity: usize,
    sum: f64,
}

impl SlidingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0.0,
        }
    }

    /// Enqueues a sample, evicting the oldest one when full.
    pub fn push(&mut self, value: f32) {
        if self.samples.len() == self.capacity {
            if let Some(oldest) = self.samples.pop_front() {
                self.sum -= oldest as f64;
            }
        }
        self.samples.push_back(value);
        self.sum += value as f64;
    }

    /// Mean of the retained samples, `0.0` when empty.
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.sum / self.samples.len() as f64
        }
    }

    pub fn sum(&self) -> f64 {
        self.sum
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
        self.sum = 0.0;
    }
}
