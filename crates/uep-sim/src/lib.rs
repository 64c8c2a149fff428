//! # UEP Simulation
//!
//! Monte Carlo estimation of per-class symbol error rates of UEP rateless
//! codes over erasure channels.
//!
//! ## Architecture
//!
//! ```text
//! RunConfig ──▶ Simulation ──▶ ParallelReducer
//!                   │               │
//!                   │      partition + worker threads
//!                   ▼               ▼
//!     RowGenerator / ChannelModel / Decoder per block
//!                                   │
//!                          AggregateResult (weighted merge)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use uep_core::{ChannelKind, CodeConfig};
//! use uep_sim::{ParallelReducer, Simulation, SimulationParameters};
//!
//! let params = SimulationParameters {
//!     code: CodeConfig {
//!         ks: vec![10, 40],
//!         rfs: vec![2, 1],
//!         ef: 2,
//!         c: 0.1,
//!         delta: 0.5,
//!     },
//!     overhead: 0.5,
//!     nblocks: 8,
//!     channel: ChannelKind::Iid { erasure: 0.1 },
//! };
//! let sim = Simulation::new(&params, 42).unwrap();
//! let result = ParallelReducer::new(2).run(&sim).unwrap();
//! assert_eq!(result.error_rates.len(), 2);
//! ```

pub mod config;
pub mod parallel;
pub mod simulation;

pub use config::RunConfig;
pub use parallel::{split_blocks, ParallelReducer};
pub use simulation::{block_seed, AggregateResult, Simulation, SimulationParameters, TrialAccumulator};
