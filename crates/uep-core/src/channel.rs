//! Erasure Channel Models
//!
//! Per-slot erasure decisions for coded symbols.
//!
//! ## Models
//!
//! - **IID**: every slot is erased independently with probability `e`.
//! - **Gilbert-Elliott**: two-state Markov chain. A slot in the Good state
//!   is delivered, a slot in the Bad state is erased; after each slot the
//!   chain moves Good→Bad with probability `p` and Bad→Good with probability
//!   `q`. Runs are geometric with means `1/p` (good) and `1/q` (bad), and the
//!   stationary erasure rate is `p / (p + q)`.
//!
//! ```text
//!          p
//!    ┌──────────┐
//!    │          ▼
//!  [Good]     [Bad]
//!  deliver    erase
//!    ▲          │
//!    └──────────┘
//!          q
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use rand::{rngs::StdRng, SeedableRng};
//! use uep_core::channel::ChannelModel;
//!
//! let mut rng = StdRng::seed_from_u64(3);
//! let mut channel = ChannelModel::gilbert_elliott(0.01, 0.1).unwrap();
//! channel.reset(&mut rng);
//! let delivered = (0..1000).filter(|_| channel.step(&mut rng)).count();
//! assert!(delivered <= 1000);
//! ```

use std::fmt;

use rand::distributions::{Bernoulli, Distribution};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{UepError, UepResult};

/// State of a two-state erasure channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    /// Slots are delivered
    Good,
    /// Slots are erased
    Bad,
}

/// Channel description as it appears in run files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelKind {
    /// Error-free channel
    Perfect,
    /// Independent erasures with probability `erasure`
    Iid { erasure: f64 },
    /// Gilbert-Elliott with transition probabilities
    GilbertElliott { p: f64, q: f64 },
    /// Gilbert-Elliott given by its mean run lengths
    GilbertElliottRuns { avg_good_run: f64, avg_bad_run: f64 },
}

impl Default for ChannelKind {
    fn default() -> Self {
        Self::Perfect
    }
}

impl ChannelKind {
    /// Build the channel model; `None` means error-free.
    pub fn build(&self) -> UepResult<Option<ChannelModel>> {
        match *self {
            ChannelKind::Perfect => Ok(None),
            ChannelKind::Iid { erasure } => ChannelModel::iid(erasure).map(Some),
            ChannelKind::GilbertElliott { p, q } => ChannelModel::gilbert_elliott(p, q).map(Some),
            ChannelKind::GilbertElliottRuns {
                avg_good_run,
                avg_bad_run,
            } => ChannelModel::from_runs(avg_good_run, avg_bad_run).map(Some),
        }
    }
}

/// Erasure channel.
#[derive(Debug, Clone)]
pub enum ChannelModel {
    /// Memoryless erasures
    Iid {
        /// Erasure probability
        erasure: f64,
        /// Per-slot erasure draw
        draw: Bernoulli,
    },
    /// Two-state Markov erasures
    GilbertElliott {
        /// Good→Bad transition probability
        p: f64,
        /// Bad→Good transition probability
        q: f64,
        /// Current state
        state: ChannelState,
    },
}

fn check_probability(name: &str, value: f64) -> UepResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(UepError::invalid(format!(
            "{name} must be a probability in [0, 1], got {value}"
        )))
    }
}

impl ChannelModel {
    /// Memoryless channel erasing each slot with probability `erasure`.
    pub fn iid(erasure: f64) -> UepResult<Self> {
        check_probability("erasure", erasure)?;
        let draw = Bernoulli::new(erasure).map_err(|e| UepError::invalid(e.to_string()))?;
        Ok(Self::Iid { erasure, draw })
    }

    /// Gilbert-Elliott channel; starts in the Good state until [`reset`](Self::reset).
    pub fn gilbert_elliott(p: f64, q: f64) -> UepResult<Self> {
        check_probability("p", p)?;
        check_probability("q", q)?;
        if p + q <= 0.0 {
            return Err(UepError::invalid(
                "p + q must be positive for a stationary distribution",
            ));
        }
        Ok(Self::GilbertElliott {
            p,
            q,
            state: ChannelState::Good,
        })
    }

    /// Gilbert-Elliott channel with the given mean good and bad run lengths.
    pub fn from_runs(avg_good_run: f64, avg_bad_run: f64) -> UepResult<Self> {
        if !(avg_good_run >= 1.0 && avg_bad_run >= 1.0) {
            return Err(UepError::invalid(format!(
                "mean run lengths must be at least 1, got good={avg_good_run} bad={avg_bad_run}"
            )));
        }
        Self::gilbert_elliott(1.0 / avg_good_run, 1.0 / avg_bad_run)
    }

    /// Stationary probability of the Good state.
    pub fn pi_good(&self) -> f64 {
        match *self {
            ChannelModel::Iid { erasure, .. } => 1.0 - erasure,
            ChannelModel::GilbertElliott { p, q, .. } => q / (p + q),
        }
    }

    /// Stationary probability of the Bad state.
    pub fn pi_bad(&self) -> f64 {
        1.0 - self.pi_good()
    }

    /// Long-run fraction of erased slots.
    pub fn average_erasure_rate(&self) -> f64 {
        self.pi_bad()
    }

    /// Current state, for the stateful model.
    pub fn state(&self) -> Option<ChannelState> {
        match *self {
            ChannelModel::Iid { .. } => None,
            ChannelModel::GilbertElliott { state, .. } => Some(state),
        }
    }

    /// Start a fresh block: the Markov state is drawn from the stationary
    /// distribution. No-op for the memoryless channel.
    pub fn reset<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if let ChannelModel::GilbertElliott { p, q, state } = self {
            let pi_bad = *p / (*p + *q);
            *state = if rng.gen::<f64>() < pi_bad {
                ChannelState::Bad
            } else {
                ChannelState::Good
            };
        }
    }

    /// Decide one slot: `true` if the coded symbol is delivered.
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        match self {
            ChannelModel::Iid { draw, .. } => !draw.sample(rng),
            ChannelModel::GilbertElliott { p, q, state } => match *state {
                ChannelState::Good => {
                    if rng.gen::<f64>() < *p {
                        *state = ChannelState::Bad;
                    }
                    true
                }
                ChannelState::Bad => {
                    if rng.gen::<f64>() < *q {
                        *state = ChannelState::Good;
                    }
                    false
                }
            },
        }
    }
}

impl fmt::Display for ChannelModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ChannelModel::Iid { erasure, .. } => write!(
                f,
                "IID channel: e = {:.2e}, pi_G = {:.2e}, pi_B = {:.2e}",
                erasure,
                self.pi_good(),
                self.pi_bad()
            ),
            ChannelModel::GilbertElliott { p, q, .. } => write!(
                f,
                "Gilbert-Elliott channel: p = {:.2e}, q = {:.2e}, pi_G = {:.2e}, pi_B = {:.2e}",
                p,
                q,
                self.pi_good(),
                self.pi_bad()
            ),
        }
    }
}
