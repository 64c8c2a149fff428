//! Burst Length Analysis
//!
//! Exact probabilities of erasure accumulation on a memoryless channel,
//! used to cross-check Monte Carlo output.
//!
//! With erasure probability `p`, let `P(j, k)` be the probability that the
//! `j`-th erasure happens exactly at slot `k`. Then
//!
//! ```text
//! P(j, j) = p^j
//! P(1, k) = (1-p)^(k-1) * p
//! P(j, k) = P(j, k-1) * (1-p) + P(j-1, k-1) * p
//! P(j, k) = 0                                      for k < j
//! ```
//!
//! The table is banded: row `j` only stores `k >= j`, and entries are
//! filled on demand in increasing `k`.
//!
//! The Monte Carlo counterparts ([`simulate_fixed_slots`],
//! [`simulate_fixed_errors`]) run an arbitrary [`ChannelModel`], so the same
//! experiment can be repeated on a bursty channel.

use rand::Rng;

use crate::channel::ChannelModel;
use crate::error::{UepError, UepResult};

/// Dynamic-programming calculator for erasure accumulation on an IID channel.
#[derive(Debug, Clone)]
pub struct BurstLengthAnalyzer {
    p: f64,
    max_errs: usize,
    /// `rows[j - 1][k - j] = P(j, k)`
    rows: Vec<Vec<f64>>,
}

impl BurstLengthAnalyzer {
    /// Analyzer for erasure probability `p` and up to `max_errs` erasures.
    pub fn new(p: f64, max_errs: usize) -> UepResult<Self> {
        if !(0.0..=1.0).contains(&p) {
            return Err(UepError::invalid(format!(
                "erasure probability must be in [0, 1], got {p}"
            )));
        }
        if max_errs == 0 {
            return Err(UepError::invalid("max_errs must be positive"));
        }

        let mut analyzer = Self {
            p,
            max_errs,
            rows: vec![Vec::new(); max_errs],
        };
        for j in 1..=max_errs {
            analyzer.cache_set(j, j, p.powf(j as f64))?;
        }
        Ok(analyzer)
    }

    /// Erasure probability.
    pub fn p(&self) -> f64 {
        self.p
    }

    /// Largest number of erasures tracked.
    pub fn max_errs(&self) -> usize {
        self.max_errs
    }

    /// Probability that exactly `max_errs - start` further erasures
    /// accumulate in `k` further slots, the last one falling on slot `k`.
    ///
    /// `start` is the number of erasures already seen and must be below
    /// `max_errs`. Fewer slots than missing erasures gives 0.
    pub fn steps_probability(&mut self, k: usize, start: usize) -> UepResult<f64> {
        if start >= self.max_errs {
            return Err(UepError::invalid(format!(
                "start = {start} must be below max_errs = {}",
                self.max_errs
            )));
        }
        if k == 0 {
            return Err(UepError::invalid("k must be positive"));
        }

        let j = self.max_errs - start;
        if k < j {
            return Ok(0.0);
        }

        let q = 1.0 - self.p;
        for m in self.cache_missing(1)..=k - j + 1 {
            let v = q.powf((m - 1) as f64) * self.p;
            self.cache_set(1, m, v)?;
        }

        for l in 2..=j {
            for m in self.cache_missing(l)..=k - j + l {
                let v = self.cache_get(l, m - 1) * q + self.cache_get(l - 1, m - 1) * self.p;
                self.cache_set(l, m, v)?;
            }
        }

        Ok(self.cache_get(j, k))
    }

    /// Probability that the remaining `max_errs - start` erasures have all
    /// occurred within `k` slots.
    pub fn within_probability(&mut self, k: usize, start: usize) -> UepResult<f64> {
        let mut total = 0.0;
        for slot in 1..=k {
            total += self.steps_probability(slot, start)?;
        }
        Ok(total)
    }

    fn cache_get(&self, j: usize, k: usize) -> f64 {
        self.rows[j - 1][k - j]
    }

    /// First `k` not yet stored in row `j`.
    fn cache_missing(&self, j: usize) -> usize {
        self.rows[j - 1].len() + j
    }

    fn cache_set(&mut self, j: usize, k: usize, v: f64) -> UepResult<()> {
        let expected = self.cache_missing(j);
        if k != expected {
            return Err(UepError::CacheOrder {
                row: j,
                expected,
                got: k,
            });
        }
        self.rows[j - 1].push(v);
        Ok(())
    }
}

/// Count the erasures in `n` slots of a freshly reset channel.
pub fn simulate_fixed_slots<R: Rng + ?Sized>(
    channel: &mut ChannelModel,
    n: usize,
    rng: &mut R,
) -> usize {
    channel.reset(rng);
    (0..n).filter(|_| !channel.step(rng)).count()
}

/// Count the slots a freshly reset channel needs to erase `errors` symbols.
///
/// The channel must have a positive long-run erasure rate.
pub fn simulate_fixed_errors<R: Rng + ?Sized>(
    channel: &mut ChannelModel,
    errors: usize,
    rng: &mut R,
) -> UepResult<usize> {
    if channel.average_erasure_rate() <= 0.0 {
        return Err(UepError::invalid(format!(
            "channel never erases, cannot wait for {errors} erasures"
        )));
    }

    channel.reset(rng);
    let mut remaining = errors;
    let mut slots = 0;
    while remaining > 0 {
        slots += 1;
        if !channel.step(rng) {
            remaining -= 1;
        }
    }
    Ok(slots)
}

/// Variance of the erasure fraction over `n` IID slots.
pub fn fixed_slots_variance(p: f64, n: usize) -> f64 {
    p * (1.0 - p) / n as f64
}

/// Reference variance of the slot count needed for `errors` IID erasures.
pub fn fixed_errors_variance(p: f64, errors: usize) -> f64 {
    let e = errors as f64;
    (-4.0 * p + 3.0 * e * p + e) / (p * p)
}
