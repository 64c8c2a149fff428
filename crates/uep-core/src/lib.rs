//! # UEP Rateless Code Core
//!
//! Building blocks for Monte Carlo studies of rateless (LT) codes with
//! unequal error protection.
//!
//! ## Overview
//!
//! Source symbols are split into priority classes. Coded symbols are built
//! from rows of source symbols whose degree follows the robust soliton
//! distribution; classes with a higher repetition factor appear in more rows
//! and are recovered earlier by a message-passing decoder.
//!
//! - **Degree distribution**: robust soliton mass function, CDF, sampler
//! - **CDF cache**: content-addressed on-disk memoization of CDFs
//! - **Row generation**: weighted position map and distinct-symbol sampling
//! - **Channels**: IID and Gilbert-Elliott erasure models
//! - **Burst analysis**: exact erasure accumulation probabilities
//! - **Decoding**: symbolic peeling decoder behind a small trait
//!
//! ## Data Flow
//!
//! ```text
//! DegreeSampler ─▶ RowGenerator ─▶ ChannelModel ─▶ Decoder ─▶ recovered flags
//!       ▲
//!    CdfCache
//! ```
//!
//! ## Example
//!
//! ```rust
//! use rand::{rngs::StdRng, SeedableRng};
//! use uep_core::prelude::*;
//!
//! let config = CodeConfig {
//!     ks: vec![10, 40],
//!     rfs: vec![2, 1],
//!     ef: 2,
//!     c: 0.1,
//!     delta: 0.5,
//! };
//! let generator = RowGenerator::new(&config).unwrap();
//! let mut channel = ChannelModel::iid(0.1).unwrap();
//! let mut decoder = MessagePassingDecoder::new(generator.k());
//! let mut rng = StdRng::seed_from_u64(5);
//!
//! channel.reset(&mut rng);
//! for _ in 0..100 {
//!     let row = generator.generate_row(&mut rng).unwrap();
//!     if channel.step(&mut rng) {
//!         decoder.add_output(&row).unwrap();
//!     }
//! }
//! decoder.run().unwrap();
//! assert_eq!(decoder.input_symbols().len(), 50);
//! ```

pub mod burst;
pub mod cdf_cache;
pub mod channel;
pub mod decoder;
pub mod degree;
pub mod error;
pub mod observe;
pub mod row_generator;
pub mod stats;

pub use burst::{
    fixed_errors_variance, fixed_slots_variance, simulate_fixed_errors, simulate_fixed_slots,
    BurstLengthAnalyzer,
};
pub use cdf_cache::CdfCache;
pub use channel::{ChannelKind, ChannelModel, ChannelState};
pub use decoder::{Decoder, MessagePassingDecoder};
pub use degree::{robust_pmd, soliton_pmd, CdfKey, CdfOrigin, DegreeSampler, RobustSoliton};
pub use error::{UepError, UepResult};
pub use row_generator::{CodeConfig, Row, RowGenerator};
pub use stats::AverageCounter;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::channel::{ChannelKind, ChannelModel};
    pub use crate::decoder::{Decoder, MessagePassingDecoder};
    pub use crate::degree::DegreeSampler;
    pub use crate::error::{UepError, UepResult};
    pub use crate::row_generator::{CodeConfig, Row, RowGenerator};
}
