//! Trailing-window mean and standard deviation, updated in O(1) per sample.

use std::collections::VecDeque;

/// Trailing window over a stream of values with O(1) mean and variance
/// updates (running mean + sum of squared deviations).
///
/// The window grows up to `capacity` and then slides, so the first values of a
/// series are summarized over however many samples have been seen so far.
/// Non-finite values take up a slot but are left out of the statistics, the
/// way a missing reading would be.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    values: VecDeque<f64>,
    finite: usize,
    mean: f64,
    m2: f64,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
            finite: 0,
            mean: 0.0,
            m2: 0.0,
        }
    }

    /// Finite values currently in the window.
    pub fn len(&self) -> usize {
        self.finite
    }

    pub fn is_empty(&self) -> bool {
        self.finite == 0
    }

    /// Push a value, evicting the oldest one once the window is full.
    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            if let Some(old) = self.values.pop_front() {
                if old.is_finite() {
                    self.remove(old);
                }
            }
        }
        self.values.push_back(value);
        if value.is_finite() {
            self.add(value);
        }

        // Overflow on extreme magnitudes; rebuild from what is in the window.
        if !self.mean.is_finite() || !self.m2.is_finite() {
            self.recompute();
        }
        // Rounding can leave a tiny negative residue on constant input.
        if self.m2 < 0.0 {
            self.m2 = 0.0;
        }
    }

    fn add(&mut self, value: f64) {
        self.finite += 1;
        let delta = value - self.mean;
        self.mean += delta / self.finite as f64;
        self.m2 += delta * (value - self.mean);
    }

    fn remove(&mut self, value: f64) {
        self.finite -= 1;
        if self.finite == 0 {
            self.mean = 0.0;
            self.m2 = 0.0;
            return;
        }
        let old_mean = self.mean;
        self.mean -= (value - old_mean) / self.finite as f64;
        self.m2 -= (value - old_mean) * (value - self.mean);
    }

    fn recompute(&mut self) {
        if self.finite == 0 {
            self.mean = 0.0;
            self.m2 = 0.0;
            return;
        }
        let n = self.finite as f64;
        let mean: f64 = self.values.iter().filter(|v| v.is_finite()).map(|v| v / n).sum();
        let m2: f64 = self.values.iter().filter(|v| v.is_finite()).map(|v| (v - mean).powi(2)).sum();
        self.mean = mean;
        self.m2 = m2;
    }

    pub fn mean(&self) -> f64 {
        if self.finite == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample (n-1) standard deviation; 0 for fewer than two values.
    pub fn std_dev(&self) -> f64 {
        if self.finite < 2 {
            return 0.0;
        }
        (self.m2 / (self.finite - 1) as f64).sqrt()
    }
}

/// Trailing rolling mean of `values` (window shrinks at the start).
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let mut w = RollingWindow::new(window);
    values
        .iter()
        .map(|&v| {
            w.push(v);
            w.mean()
        })
        .collect()
}

/// Trailing rolling mean and sample standard deviation, one pair per input.
pub fn rolling_mean_std(values: &[f64], window: usize) -> Vec<(f64, f64)> {
    let mut w = RollingWindow::new(window);
    values
        .iter()
        .map(|&v| {
            w.push(v);
            (w.mean(), w.std_dev())
        })
        .collect()
}
