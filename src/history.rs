use std::collections::VecDeque;

pub const DEFAULT_HISTORY_SIZE: usize = 60;

/// Fixed-capacity FIFO buffer: pushing past capacity evicts the oldest value.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    capacity: usize,
    values: VecDeque<T>,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: T) {
        if self.values.len() >= self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Rising,
    Falling,
    Steady,
}

impl Trend {
    pub fn arrow(self) -> &'static str {
        match self {
            Trend::Rising => "↑",
            Trend::Falling => "↓",
            Trend::Steady => "→",
        }
    }
}

/// Points the newer half's mean must move by before a trend is reported.
const TREND_THRESHOLD: f64 = 5.0;

impl RingBuffer<f64> {
    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }

    /// Compare the mean of the newer half with the older half.
    pub fn trend(&self) -> Trend {
        let len = self.values.len();
        if len < 4 {
            return Trend::Steady;
        }
        let half = len / 2;
        let older: f64 = self.values.iter().take(half).sum::<f64>() / half as f64;
        let newer: f64 = self.values.iter().skip(len - half).sum::<f64>() / half as f64;
        let delta = newer - older;
        if delta >= TREND_THRESHOLD {
            Trend::Rising
        } else if delta <= -TREND_THRESHOLD {
            Trend::Falling
        } else {
            Trend::Steady
        }
    }
}

/// Host CPU and memory percentages over the last `capacity` samples.
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    pub cpu_history: RingBuffer<f64>,
    pub mem_history: RingBuffer<f64>,
}

impl MetricsHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cpu_history: RingBuffer::new(capacity),
            mem_history: RingBuffer::new(capacity),
        }
    }

    pub fn push(&mut self, cpu_percent: f64, mem_percent: f64) {
        self.cpu_history.push(cpu_percent);
        self.mem_history.push(mem_percent);
    }
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_never_exceeds_capacity() {
        let mut ring = RingBuffer::new(3);
        for i in 0..10 {
            ring.push(i);
            assert!(ring.len() <= 3);
        }
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![7, 8, 9]);
        assert_eq!(ring.iter().last(), Some(&9));
    }

    #[test]
    fn test_zero_capacity_is_promoted() {
        let mut ring = RingBuffer::new(0);
        ring.push(1.0);
        ring.push(2.0);
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.iter().last(), Some(&2.0));
    }

    #[test]
    fn test_mean_and_max() {
        let mut ring = RingBuffer::new(4);
        assert_eq!(ring.mean(), None);
        for v in [10.0, 20.0, 30.0] {
            ring.push(v);
        }
        assert_eq!(ring.mean(), Some(20.0));
        assert_eq!(ring.max(), Some(30.0));
    }

    #[test]
    fn test_trend() {
        let mut ring = RingBuffer::new(6);
        for v in [10.0, 10.0, 10.0, 30.0, 30.0, 30.0] {
            ring.push(v);
        }
        assert_eq!(ring.trend(), Trend::Rising);

        let mut ring = RingBuffer::new(6);
        for v in [50.0, 50.0, 20.0, 20.0] {
            ring.push(v);
        }
        assert_eq!(ring.trend(), Trend::Falling);

        let mut ring = RingBuffer::new(6);
        for v in [20.0, 22.0, 21.0, 23.0] {
            ring.push(v);
        }
        assert_eq!(ring.trend(), Trend::Steady);
    }

    #[test]
    fn test_history_pushes_both_series() {
        let mut history = MetricsHistory::with_capacity(2);
        history.push(10.0, 40.0);
        history.push(20.0, 50.0);
        history.push(30.0, 60.0);
        assert_eq!(history.cpu_history.len(), 2);
        assert_eq!(history.mem_history.iter().last(), Some(&60.0));
    }
}
