//! Single-pass summary statistics.
//!
//! `RunningStats` uses Welford's update so the aggregator can fold results in as
//! they arrive. `merge` combines two partial accumulators (Chan et al.), which is
//! what makes per-thread partial sums order independent.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunningStats {
    count: usize,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut stats = Self::new();
        for v in values {
            stats.push(v);
        }
        stats
    }

    /// Add one value. Non-finite values are ignored.
    pub fn push(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn merge(&mut self, other: &RunningStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let n_a = self.count as f64;
        let n_b = other.count as f64;
        let n = n_a + n_b;
        let delta = other.mean - self.mean;
        self.mean += delta * n_b / n;
        self.m2 += other.m2 + delta * delta * n_a * n_b / n;
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Population variance.
    pub fn variance(&self) -> Option<f64> {
        (self.count > 0).then(|| (self.m2 / self.count as f64).max(0.0))
    }

    /// Population standard deviation.
    pub fn std_dev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_two_pass_formulas() {
        let values = [10.0, 10.0, 10.0, 10.0, 100.0];
        let stats = RunningStats::from_values(values);
        assert_eq!(stats.count(), 5);
        assert!((stats.mean().unwrap() - 28.0).abs() < 1e-12);
        assert!((stats.std_dev().unwrap() - 36.0).abs() < 1e-12);
        assert_eq!(stats.min(), Some(10.0));
        assert_eq!(stats.max(), Some(100.0));
    }

    #[test]
    fn merge_is_order_independent() {
        let values: Vec<f64> = (0..40).map(|i| (i as f64 * 0.37).sin() * 5.0 + 2.0).collect();
        let whole = RunningStats::from_values(values.iter().copied());

        let mut left = RunningStats::from_values(values[..13].iter().copied());
        let right = RunningStats::from_values(values[13..].iter().copied());
        left.merge(&right);

        let mut rev = RunningStats::from_values(values[13..].iter().copied());
        rev.merge(&RunningStats::from_values(values[..13].iter().copied()));

        for s in [left, rev] {
            assert_eq!(s.count(), whole.count());
            assert!((s.mean().unwrap() - whole.mean().unwrap()).abs() < 1e-12);
            assert!((s.variance().unwrap() - whole.variance().unwrap()).abs() < 1e-10);
        }
    }

    #[test]
    fn empty_has_no_moments() {
        let mut s = RunningStats::new();
        s.push(f64::NAN);
        assert!(s.is_empty());
        assert_eq!(s.mean(), None);
        assert_eq!(s.std_dev(), None);
    }
}
