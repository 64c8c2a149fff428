//! UEP Row Generator
//!
//! Builds the rows (sets of source-symbol indices) that make up coded
//! symbols. Unequal protection comes from the degree positions: the source
//! symbols of class `i` are repeated `RFs[i]` times, and the whole sequence is
//! expanded `EF` times, giving `Kdeg = EF * sum(Ks[i] * RFs[i])` positions.
//!
//! ```text
//! Ks = [2, 3], RFs = [2, 1], EF = 2
//!
//! positions: 0 1 2 3 4 5 6 | 7 8 9 10 11 12 13
//! symbols:   0 1 0 1 2 3 4 | 0 1 0  1  2  3  4
//! ```
//!
//! A row samples a degree `d` from the robust soliton distribution over
//! `Kdeg`, draws distinct positions uniformly without replacement and maps
//! them to symbols. Positions mapping to the same symbol collapse; the sampler
//! keeps drawing until the row holds exactly `min(d, K)` symbols, so symbols
//! with more positions are more likely to be picked.
//!
//! ## Example
//!
//! ```rust
//! use rand::{rngs::StdRng, SeedableRng};
//! use uep_core::row_generator::{CodeConfig, RowGenerator};
//!
//! let config = CodeConfig {
//!     ks: vec![100, 900],
//!     rfs: vec![3, 1],
//!     ef: 4,
//!     c: 0.1,
//!     delta: 0.5,
//! };
//! let generator = RowGenerator::new(&config).unwrap();
//! let mut rng = StdRng::seed_from_u64(1);
//! let row = generator.generate_row(&mut rng).unwrap();
//! assert!(row.iter().all(|&s| s < 1000));
//! ```

use std::collections::BTreeSet;

use rand::seq::index::{self, IndexVec};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cdf_cache::CdfCache;
use crate::degree::{robust_spike, DegreeSampler};
use crate::error::{UepError, UepResult};

/// Source symbols combined into one coded symbol.
pub type Row = BTreeSet<usize>;

/// Code structure shared by the generator and the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeConfig {
    /// Source symbols per priority class, most important first.
    pub ks: Vec<usize>,
    /// Repetition factor per class.
    pub rfs: Vec<usize>,
    /// Expansion factor applied to the whole position map.
    pub ef: usize,
    /// Robust soliton `c`.
    pub c: f64,
    /// Robust soliton `delta`.
    pub delta: f64,
}

impl CodeConfig {
    /// Equal protection for `k` symbols: one class, RF = EF = 1.
    pub fn equal_protection(k: usize, c: f64, delta: f64) -> Self {
        Self {
            ks: vec![k],
            rfs: vec![1],
            ef: 1,
            c,
            delta,
        }
    }

    /// Check sizes and positivity.
    pub fn validate(&self) -> UepResult<()> {
        if self.ks.is_empty() {
            return Err(UepError::invalid("Ks must contain at least one class"));
        }
        if self.ks.len() != self.rfs.len() {
            return Err(UepError::invalid(format!(
                "len(Ks) = {} differs from len(RFs) = {}",
                self.ks.len(),
                self.rfs.len()
            )));
        }
        if self.ks.iter().any(|&k| k == 0) {
            return Err(UepError::invalid("every class size in Ks must be positive"));
        }
        if self.rfs.iter().any(|&rf| rf == 0) {
            return Err(UepError::invalid("every repetition factor in RFs must be positive"));
        }
        if self.ef == 0 {
            return Err(UepError::invalid("EF must be positive"));
        }
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(UepError::invalid(format!("c must be positive, got {}", self.c)));
        }
        if !(self.delta.is_finite() && self.delta > 0.0) {
            return Err(UepError::invalid(format!(
                "delta must be positive, got {}",
                self.delta
            )));
        }
        Ok(())
    }

    /// Total source symbols `K = sum(Ks)`.
    pub fn k(&self) -> usize {
        self.ks.iter().sum()
    }

    /// Degree positions `Kdeg = EF * sum(Ks[i] * RFs[i])`.
    pub fn kdeg(&self) -> usize {
        self.ef * self.ks.iter().zip(&self.rfs).map(|(k, rf)| k * rf).sum::<usize>()
    }

    /// Ensure the robust soliton spike over `Kdeg` stays within `K` symbols.
    fn check_spike(&self) -> UepResult<()> {
        let spike = robust_spike(self.kdeg(), self.c, self.delta);
        let k = self.k();
        if spike > k {
            return Err(UepError::SpikeOutOfRange { spike, limit: k });
        }
        Ok(())
    }
}

/// Generates UEP rows.
///
/// The position map is built once; cloning a generator shares the degree
/// CDF and copies the map.
#[derive(Debug, Clone)]
pub struct RowGenerator {
    config: CodeConfig,
    k: usize,
    degrees: DegreeSampler,
    pos_map: Vec<usize>,
}

impl RowGenerator {
    /// Build a generator computing the degree CDF in memory.
    pub fn new(config: &CodeConfig) -> UepResult<Self> {
        Self::build(config, |kdeg| DegreeSampler::new(kdeg, config.c, config.delta))
    }

    /// Build a generator whose degree CDF goes through `cache`.
    pub fn with_cache(config: &CodeConfig, cache: &CdfCache) -> UepResult<Self> {
        Self::build(config, |kdeg| {
            DegreeSampler::cached(kdeg, config.c, config.delta, cache)
        })
    }

    fn build<F>(config: &CodeConfig, sampler: F) -> UepResult<Self>
    where
        F: FnOnce(usize) -> UepResult<DegreeSampler>,
    {
        config.validate()?;
        config.check_spike()?;

        let degrees = sampler(config.kdeg())?;
        let pos_map = build_position_map(&config.ks, &config.rfs, config.ef);

        Ok(Self {
            k: config.k(),
            config: config.clone(),
            degrees,
            pos_map,
        })
    }

    /// Code parameters.
    pub fn config(&self) -> &CodeConfig {
        &self.config
    }

    /// Symbols per class.
    pub fn ks(&self) -> &[usize] {
        &self.config.ks
    }

    /// Total source symbols `K`.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Degree positions `Kdeg`.
    pub fn kdeg(&self) -> usize {
        self.pos_map.len()
    }

    /// The degree sampler.
    pub fn degrees(&self) -> &DegreeSampler {
        &self.degrees
    }

    /// Position to symbol map, `Kdeg` entries.
    pub fn position_map(&self) -> &[usize] {
        &self.pos_map
    }

    /// Generate one row of `min(d, K)` distinct symbols.
    pub fn generate_row<R: Rng + ?Sized>(&self, rng: &mut R) -> UepResult<Row> {
        let degree = self.degrees.sample(rng)?.min(self.k);
        let map = |pos: usize| self.pos_map[pos];
        Ok(mapped_sample(rng, self.pos_map.len(), degree, map))
    }
}

/// Concatenate each class's index range `RFs[i]` times, then repeat the
/// whole sequence `EF` times.
pub fn build_position_map(ks: &[usize], rfs: &[usize], ef: usize) -> Vec<usize> {
    let mut block = Vec::new();
    let mut offset = 0;
    for (&k, &rf) in ks.iter().zip(rfs) {
        for _ in 0..rf {
            block.extend(offset..offset + k);
        }
        offset += k;
    }

    let mut map = Vec::with_capacity(block.len() * ef);
    for _ in 0..ef {
        map.extend_from_slice(&block);
    }
    map
}

/// Draw `amount` distinct positions uniformly from `[0, len)`.
fn draw_positions<R: Rng + ?Sized>(rng: &mut R, len: usize, amount: usize) -> IndexVec {
    index::sample(rng, len, amount)
}

/// Sample `size` distinct mapped values out of positions `[0, len)`.
///
/// Small targets grow a set from uniform position draws; large targets start
/// from the full image and remove uniformly drawn positions. Either way, each
/// round draws only as many positions as are still missing (or in excess), and
/// collisions under `map` are made up by later rounds. `size` must not exceed
/// the number of distinct values of `map` over `[0, len)`.
pub fn mapped_sample<R, F>(rng: &mut R, len: usize, size: usize, map: F) -> BTreeSet<usize>
where
    R: Rng + ?Sized,
    F: Fn(usize) -> usize,
{
    if 2 * size <= len {
        grow_sample(rng, len, size, map)
    } else {
        shrink_sample(rng, len, size, map)
    }
}

fn grow_sample<R, F>(rng: &mut R, len: usize, size: usize, map: F) -> BTreeSet<usize>
where
    R: Rng + ?Sized,
    F: Fn(usize) -> usize,
{
    let mut sample = BTreeSet::new();
    while sample.len() < size {
        let missing = size - sample.len();
        sample.extend(draw_positions(rng, len, missing).into_iter().map(&map));
    }
    sample
}

fn shrink_sample<R, F>(rng: &mut R, len: usize, size: usize, map: F) -> BTreeSet<usize>
where
    R: Rng + ?Sized,
    F: Fn(usize) -> usize,
{
    let mut sample: BTreeSet<usize> = (0..len).map(&map).collect();
    while sample.len() > size {
        let excess = sample.len() - size;
        for pos in draw_positions(rng, len, excess) {
            sample.remove(&map(pos));
        }
    }
    sample
}
