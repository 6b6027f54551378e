//! Bounded window of recent latency observations

use std::collections::VecDeque;

/// Fixed-capacity ring of the most recent latency samples (milliseconds).
///
/// Pushing into a full window evicts the oldest sample.
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, latency_ms: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(latency_ms);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Arithmetic mean, `None` when empty
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    /// Keep only the newest `keep` samples once the window holds more than `threshold`
    pub fn trim(&mut self, threshold: usize, keep: usize) {
        if self.samples.len() > threshold {
            let excess = self.samples.len().saturating_sub(keep);
            self.samples.drain(..excess);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut window = LatencyWindow::new(3);
        for latency in [1.0, 2.0, 3.0, 4.0] {
            window.push(latency);
        }

        assert_eq!(window.len(), 3);
        assert_eq!(window.iter().copied().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_mean() {
        let mut window = LatencyWindow::new(10);
        assert_eq!(window.mean(), None);

        window.push(120.0);
        window.push(80.0);
        assert_eq!(window.mean(), Some(100.0));
    }

    #[test]
    fn test_trim_keeps_most_recent() {
        let mut window = LatencyWindow::new(1000);
        for i in 0..101 {
            window.push(i as f64);
        }

        window.trim(100, 50);

        assert_eq!(window.len(), 50);
        assert_eq!(window.iter().next(), Some(&51.0));
        assert_eq!(window.iter().last(), Some(&100.0));
    }

    #[test]
    fn test_trim_below_threshold_is_noop() {
        let mut window = LatencyWindow::new(1000);
        for i in 0..100 {
            window.push(i as f64);
        }

        window.trim(100, 50);
        assert_eq!(window.len(), 100);
    }
}
