//! Weighted running averages.

use serde::{Deserialize, Serialize};

/// Running weighted mean, updated one observation at a time.
///
/// ```rust
/// use uep_core::stats::AverageCounter;
///
/// let mut rate = AverageCounter::default();
/// rate.add(0.2, 3.0);
/// rate.add(0.6, 1.0);
/// assert!((rate.avg() - 0.3).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AverageCounter {
    avg: f64,
    sum_w: f64,
}

impl AverageCounter {
    /// Counter that already holds mean `avg` over total weight `sum_w`.
    pub fn new(avg: f64, sum_w: f64) -> Self {
        Self { avg, sum_w }
    }

    /// Add observation `x` with weight `w`.
    ///
    /// Zero-weight observations leave the mean untouched.
    pub fn add(&mut self, x: f64, w: f64) {
        let new_sum_w = self.sum_w + w;
        if new_sum_w == 0.0 {
            return;
        }
        self.avg = (self.sum_w * self.avg + x * w) / new_sum_w;
        self.sum_w = new_sum_w;
    }

    /// Fold another counter in, as one observation of its mean and weight.
    pub fn merge(&mut self, other: &AverageCounter) {
        self.add(other.avg, other.sum_w);
    }

    /// Current mean; 0 before any weighted observation.
    pub fn avg(&self) -> f64 {
        self.avg
    }

    /// Sum of weights seen so far.
    pub fn total_weight(&self) -> f64 {
        self.sum_w
    }
}
