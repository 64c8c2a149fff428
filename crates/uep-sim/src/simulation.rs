//! Block-Error Simulation
//!
//! One [`Simulation`] runs a contiguous range of blocks sequentially. Each
//! block:
//!
//! 1. resets the decoder to `K = sum(Ks)` source symbols and the channel to a
//!    fresh initial state,
//! 2. generates `n = ceil(K * (1 + overhead))` rows and offers each one to
//!    the channel, feeding the delivered rows to the decoder,
//! 3. runs the decoder and counts the unrecovered symbols of each class.
//!
//! ## Reproducibility
//!
//! Every block draws from its own generator seeded with
//! [`block_seed`]`(seed, block)`, where `block` is the global block index.
//! Splitting a run into partitions therefore replays exactly the same blocks
//! as a sequential run, whatever the partitioning.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use uep_core::{
    AverageCounter, CdfCache, ChannelKind, ChannelModel, CodeConfig, Decoder,
    MessagePassingDecoder, RowGenerator, UepError, UepResult,
};

/// Everything that defines one simulated point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    /// Code structure
    #[serde(flatten)]
    pub code: CodeConfig,
    /// Extra coded symbols per source symbol, `n = ceil(K * (1 + overhead))`
    pub overhead: f64,
    /// Number of blocks to simulate
    pub nblocks: usize,
    /// Erasure channel
    #[serde(default)]
    pub channel: ChannelKind,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            code: CodeConfig {
                ks: vec![100, 900],
                rfs: vec![3, 1],
                ef: 4,
                c: 0.1,
                delta: 0.5,
            },
            overhead: 0.25,
            nblocks: 1000,
            channel: ChannelKind::Perfect,
        }
    }
}

impl SimulationParameters {
    /// Check the code, overhead, block count and channel.
    pub fn validate(&self) -> UepResult<()> {
        self.code.validate()?;
        if !(self.overhead.is_finite() && self.overhead >= 0.0) {
            return Err(UepError::invalid(format!(
                "overhead must be a non-negative number, got {}",
                self.overhead
            )));
        }
        if self.nblocks == 0 {
            return Err(UepError::invalid("nblocks must be positive"));
        }
        self.channel.build()?;
        Ok(())
    }

    /// Coded symbols sent per block.
    pub fn n_slots(&self) -> usize {
        (self.code.k() as f64 * (1.0 + self.overhead)).ceil() as usize
    }
}

/// Seed of the generator driving block `block` of a run seeded with `seed`.
///
/// SplitMix64 finalizer over the seed offset by the block index, so nearby
/// blocks get unrelated streams.
pub fn block_seed(seed: u64, block: u64) -> u64 {
    let mut z = seed.wrapping_add(block.wrapping_add(1).wrapping_mul(0x9e37_79b9_7f4a_7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Per-run counters, owned by one simulation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialAccumulator {
    error_counts: Vec<u64>,
    drop_count: u64,
    ripple_sum: f64,
    blocks: usize,
}

impl TrialAccumulator {
    /// Empty accumulator for `classes` priority classes.
    pub fn new(classes: usize) -> Self {
        Self {
            error_counts: vec![0; classes],
            ..Default::default()
        }
    }

    /// Record one decoded block.
    ///
    /// `decoded` holds the recovery flag of every source symbol, split into
    /// classes by `ks`.
    pub fn record_block(&mut self, ks: &[usize], decoded: &[bool], drops: u64, ripple: f64) {
        let mut offset = 0;
        for (count, &k) in self.error_counts.iter_mut().zip(ks) {
            *count += decoded[offset..offset + k].iter().filter(|&&d| !d).count() as u64;
            offset += k;
        }
        self.drop_count += drops;
        self.ripple_sum += ripple;
        self.blocks += 1;
    }

    /// Blocks recorded so far.
    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// Rates over the recorded blocks, `n` slots each.
    pub fn finish(&self, ks: &[usize], n: usize) -> AggregateResult {
        let blocks = self.blocks.max(1) as f64;
        AggregateResult {
            error_rates: self
                .error_counts
                .iter()
                .zip(ks)
                .map(|(&e, &k)| e as f64 / (blocks * k as f64))
                .collect(),
            drop_rate: self.drop_count as f64 / (blocks * n as f64),
            avg_ripple: self.ripple_sum / blocks,
            error_counts: self.error_counts.clone(),
            drop_count: self.drop_count,
            nblocks: self.blocks,
        }
    }
}

/// Outcome of a simulation, possibly merged over partitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Fraction of unrecovered symbols per class
    pub error_rates: Vec<f64>,
    /// Fraction of erased slots
    pub drop_rate: f64,
    /// Mean of the per-block average ripple size
    pub avg_ripple: f64,
    /// Unrecovered symbols per class, summed over blocks
    pub error_counts: Vec<u64>,
    /// Erased slots, summed over blocks
    pub drop_count: u64,
    /// Blocks contributing to this result
    pub nblocks: usize,
}

impl AggregateResult {
    /// Combine partition results.
    ///
    /// Rates are averaged with each partition weighted by its block count;
    /// raw counts are summed.
    pub fn merge(parts: &[AggregateResult]) -> UepResult<AggregateResult> {
        let first = parts
            .first()
            .ok_or_else(|| UepError::invalid("no partition results to merge"))?;
        let classes = first.error_rates.len();

        let mut rates = vec![AverageCounter::default(); classes];
        let mut drop_rate = AverageCounter::default();
        let mut ripple = AverageCounter::default();
        let mut error_counts = vec![0u64; classes];
        let mut drop_count = 0;
        let mut nblocks = 0;

        for part in parts {
            if part.error_rates.len() != classes || part.error_counts.len() != classes {
                return Err(UepError::invalid(format!(
                    "partition reports {} classes, expected {classes}",
                    part.error_rates.len()
                )));
            }
            let w = part.nblocks as f64;
            for (avg, &r) in rates.iter_mut().zip(&part.error_rates) {
                avg.add(r, w);
            }
            for (total, &e) in error_counts.iter_mut().zip(&part.error_counts) {
                *total += e;
            }
            drop_rate.add(part.drop_rate, w);
            ripple.add(part.avg_ripple, w);
            drop_count += part.drop_count;
            nblocks += part.nblocks;
        }

        Ok(AggregateResult {
            error_rates: rates.iter().map(AverageCounter::avg).collect(),
            drop_rate: drop_rate.avg(),
            avg_ripple: ripple.avg(),
            error_counts,
            drop_count,
            nblocks,
        })
    }
}

/// Sequential simulation over a range of blocks.
#[derive(Debug, Clone)]
pub struct Simulation<D = MessagePassingDecoder> {
    params: SimulationParameters,
    rowgen: RowGenerator,
    channel: Option<ChannelModel>,
    decoder: D,
    seed: u64,
    first_block: usize,
    nblocks: usize,
}

impl Simulation<MessagePassingDecoder> {
    /// Simulation computing its degree CDF in memory.
    pub fn new(params: &SimulationParameters, seed: u64) -> UepResult<Self> {
        params.validate()?;
        let rowgen = RowGenerator::new(&params.code)?;
        Self::assemble(params, rowgen, seed)
    }

    /// Simulation loading its degree CDF through `cache`.
    pub fn with_cache(params: &SimulationParameters, seed: u64, cache: &CdfCache) -> UepResult<Self> {
        params.validate()?;
        let rowgen = RowGenerator::with_cache(&params.code, cache)?;
        Self::assemble(params, rowgen, seed)
    }

    fn assemble(params: &SimulationParameters, rowgen: RowGenerator, seed: u64) -> UepResult<Self> {
        Ok(Self {
            channel: params.channel.build()?,
            decoder: MessagePassingDecoder::new(rowgen.k()),
            rowgen,
            params: params.clone(),
            seed,
            first_block: 0,
            nblocks: params.nblocks,
        })
    }
}

impl<D: Decoder> Simulation<D> {
    /// Swap in another decoder.
    pub fn with_decoder<E: Decoder>(self, decoder: E) -> Simulation<E> {
        Simulation {
            params: self.params,
            rowgen: self.rowgen,
            channel: self.channel,
            decoder,
            seed: self.seed,
            first_block: self.first_block,
            nblocks: self.nblocks,
        }
    }

    /// Parameters of the simulated point.
    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    /// Run seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Global index of the first block this simulation runs.
    pub fn first_block(&self) -> usize {
        self.first_block
    }

    /// Number of blocks this simulation runs.
    pub fn nblocks(&self) -> usize {
        self.nblocks
    }

    /// Coded symbols per block.
    pub fn n_slots(&self) -> usize {
        self.params.n_slots()
    }

    /// Independent copy running blocks `first_block..first_block + nblocks`.
    pub fn partition(&self, first_block: usize, nblocks: usize) -> Self
    where
        D: Clone,
    {
        Self {
            first_block,
            nblocks,
            ..self.clone()
        }
    }

    /// Run every block and return the per-class rates.
    ///
    /// Any decoder error aborts the run.
    pub fn run(&mut self) -> UepResult<AggregateResult> {
        let ks = self.params.code.ks.clone();
        let k = self.rowgen.k();
        let n = self.n_slots();
        let mut acc = TrialAccumulator::new(ks.len());

        for block in self.first_block..self.first_block + self.nblocks {
            let mut rng = StdRng::seed_from_u64(block_seed(self.seed, block as u64));

            self.decoder.reset(k);
            if let Some(channel) = self.channel.as_mut() {
                channel.reset(&mut rng);
            }

            let mut drops = 0u64;
            for _ in 0..n {
                let row = self.rowgen.generate_row(&mut rng)?;
                let delivered = match self.channel.as_mut() {
                    Some(channel) => channel.step(&mut rng),
                    None => true,
                };
                if delivered {
                    self.decoder.add_output(&row)?;
                } else {
                    drops += 1;
                }
            }

            self.decoder.run()?;
            let decoded = self.decoder.input_symbols();
            if decoded.len() != k {
                return Err(UepError::Decoder(format!(
                    "decoder returned {} symbol flags, expected {k}",
                    decoded.len()
                )));
            }
            acc.record_block(&ks, decoded, drops, self.decoder.average_ripple_size());
        }

        let result = acc.finish(&ks, n);
        debug!(
            first_block = self.first_block,
            blocks = result.nblocks,
            drops = result.drop_count,
            errors = ?result.error_counts,
            "simulation partition complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::HashSet;
    use uep_core::Row;

    fn small_params() -> SimulationParameters {
        SimulationParameters {
            code: CodeConfig {
                ks: vec![10, 40],
                rfs: vec![2, 1],
                ef: 2,
                c: 0.1,
                delta: 0.5,
            },
            overhead: 0.5,
            nblocks: 12,
            channel: ChannelKind::Iid { erasure: 0.1 },
        }
    }

    /// Recovers exactly the symbols that appear in some received row.
    #[derive(Debug, Clone, Default)]
    struct CoverageDecoder {
        seen: Vec<bool>,
        outputs: usize,
        runs: usize,
    }

    impl Decoder for CoverageDecoder {
        fn reset(&mut self, k: usize) {
            self.seen = vec![false; k];
            self.outputs = 0;
        }

        fn add_output(&mut self, row: &Row) -> UepResult<()> {
            for &i in row {
                self.seen[i] = true;
            }
            self.outputs += 1;
            Ok(())
        }

        fn run(&mut self) -> UepResult<()> {
            self.runs += 1;
            Ok(())
        }

        fn input_symbols(&self) -> &[bool] {
            &self.seen
        }

        fn average_ripple_size(&self) -> f64 {
            self.outputs as f64
        }
    }

    /// Fails on its first run.
    #[derive(Debug, Clone, Default)]
    struct FailingDecoder {
        flags: Vec<bool>,
    }

    impl Decoder for FailingDecoder {
        fn reset(&mut self, k: usize) {
            self.flags = vec![false; k];
        }

        fn add_output(&mut self, _row: &Row) -> UepResult<()> {
            Ok(())
        }

        fn run(&mut self) -> UepResult<()> {
            Err(UepError::Decoder("solver crashed".into()))
        }

        fn input_symbols(&self) -> &[bool] {
            &self.flags
        }

        fn average_ripple_size(&self) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_n_slots() {
        let params = small_params();
        assert_eq!(params.n_slots(), 75);

        let params = SimulationParameters {
            overhead: 0.0,
            ..small_params()
        };
        assert_eq!(params.n_slots(), 50);

        let params = SimulationParameters {
            overhead: 0.01,
            ..small_params()
        };
        assert_eq!(params.n_slots(), 51);
    }

    #[test]
    fn test_validation() {
        assert!(small_params().validate().is_ok());
        assert!(SimulationParameters::default().validate().is_ok());

        let bad = SimulationParameters {
            overhead: -0.1,
            ..small_params()
        };
        assert!(bad.validate().is_err());

        let bad = SimulationParameters {
            nblocks: 0,
            ..small_params()
        };
        assert!(bad.validate().is_err());

        let bad = SimulationParameters {
            channel: ChannelKind::Iid { erasure: 1.5 },
            ..small_params()
        };
        assert!(bad.validate().is_err());

        let mut bad = small_params();
        bad.code.rfs = vec![1];
        assert!(Simulation::new(&bad, 0).is_err());
    }

    #[test]
    fn test_block_seeds_are_distinct() {
        let seeds: HashSet<u64> = (0..10_000).map(|b| block_seed(42, b)).collect();
        assert_eq!(seeds.len(), 10_000);
        assert_ne!(block_seed(1, 0), block_seed(2, 0));
    }

    #[test]
    fn test_perfect_channel_with_large_overhead_recovers_everything() {
        let params = SimulationParameters {
            overhead: 2.0,
            nblocks: 5,
            channel: ChannelKind::Perfect,
            ..small_params()
        };
        let result = Simulation::new(&params, 3).unwrap().run().unwrap();
        assert_eq!(result.drop_count, 0);
        assert_eq!(result.drop_rate, 0.0);
        assert_eq!(result.nblocks, 5);
        assert!(result.error_rates.iter().all(|&r| r < 0.25), "{result:?}");
    }

    #[test]
    fn test_dead_channel_loses_everything() {
        let params = SimulationParameters {
            nblocks: 3,
            channel: ChannelKind::Iid { erasure: 1.0 },
            ..small_params()
        };
        let result = Simulation::new(&params, 1).unwrap().run().unwrap();
        assert_eq!(result.drop_count, 3 * 75);
        assert_relative_eq!(result.drop_rate, 1.0);
        assert_eq!(result.error_counts, vec![30, 120]);
        assert_eq!(result.error_rates, vec![1.0, 1.0]);
        assert_eq!(result.avg_ripple, 0.0);
    }

    #[test]
    fn test_harness_with_test_double() {
        let params = SimulationParameters {
            nblocks: 4,
            channel: ChannelKind::Iid { erasure: 0.5 },
            ..small_params()
        };
        let mut sim = Simulation::new(&params, 9)
            .unwrap()
            .with_decoder(CoverageDecoder::default());
        let result = sim.run().unwrap();

        assert_eq!(sim.decoder.runs, 4);
        // The test double reports the number of delivered rows as ripple
        let delivered = 4.0 * 75.0 - result.drop_count as f64;
        assert_relative_eq!(result.avg_ripple, delivered / 4.0);
        assert_relative_eq!(result.drop_rate, result.drop_count as f64 / 300.0);
        for (rate, (&count, &k)) in result
            .error_rates
            .iter()
            .zip(result.error_counts.iter().zip(&params.code.ks))
        {
            assert_relative_eq!(*rate, count as f64 / (4.0 * k as f64));
        }
    }

    #[test]
    fn test_decoder_error_aborts_run() {
        let mut sim = Simulation::new(&small_params(), 0)
            .unwrap()
            .with_decoder(FailingDecoder::default());
        assert!(matches!(sim.run(), Err(UepError::Decoder(_))));
    }

    #[test]
    fn test_same_seed_same_result() {
        let params = small_params();
        let a = Simulation::new(&params, 77).unwrap().run().unwrap();
        let b = Simulation::new(&params, 77).unwrap().run().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_partitions_replay_the_same_blocks() {
        let params = small_params();
        let sim = Simulation::new(&params, 5).unwrap();

        let whole = sim.clone().run().unwrap();
        let head = sim.partition(0, 7).run().unwrap();
        let tail = sim.partition(7, 5).run().unwrap();

        assert_eq!(head.drop_count + tail.drop_count, whole.drop_count);
        for c in 0..2 {
            assert_eq!(
                head.error_counts[c] + tail.error_counts[c],
                whole.error_counts[c]
            );
        }
    }

    #[test]
    fn test_merge_weights_by_blocks() {
        let a = AggregateResult {
            error_rates: vec![0.1, 0.2],
            drop_rate: 0.1,
            avg_ripple: 2.0,
            error_counts: vec![3, 24],
            drop_count: 22,
            nblocks: 3,
        };
        let b = AggregateResult {
            error_rates: vec![0.5, 0.0],
            drop_rate: 0.3,
            avg_ripple: 1.0,
            error_counts: vec![5, 0],
            drop_count: 23,
            nblocks: 1,
        };
        let merged = AggregateResult::merge(&[a, b]).unwrap();
        assert_relative_eq!(merged.error_rates[0], 0.2);
        assert_relative_eq!(merged.error_rates[1], 0.15);
        assert_relative_eq!(merged.drop_rate, 0.15);
        assert_relative_eq!(merged.avg_ripple, 1.75);
        assert_eq!(merged.error_counts, vec![8, 24]);
        assert_eq!(merged.drop_count, 45);
        assert_eq!(merged.nblocks, 4);

        assert!(AggregateResult::merge(&[]).is_err());
    }

    #[test]
    fn test_accumulator_rates() {
        let mut acc = TrialAccumulator::new(2);
        assert_eq!(acc.blocks(), 0);
        acc.record_block(&[1, 2], &[false, true, false], 4, 1.5);
        assert_eq!(acc.blocks(), 1);
        let result = acc.finish(&[1, 2], 10);
        assert_eq!(result.error_counts, vec![1, 1]);
        assert_relative_eq!(result.error_rates[1], 0.5);
        assert_relative_eq!(result.drop_rate, 0.4);
        assert_relative_eq!(result.avg_ripple, 1.5);
    }

    /// Counts the rows it is handed.
    #[derive(Debug, Clone, Default)]
    struct CountingDecoder {
        flags: Vec<bool>,
        rows: usize,
    }

    impl Decoder for CountingDecoder {
        fn reset(&mut self, k: usize) {
            self.flags = vec![true; k];
        }

        fn add_output(&mut self, _row: &Row) -> UepResult<()> {
            self.rows += 1;
            Ok(())
        }

        fn run(&mut self) -> UepResult<()> {
            Ok(())
        }

        fn input_symbols(&self) -> &[bool] {
            &self.flags
        }

        fn average_ripple_size(&self) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_rows_drawn_before_channel() {
        // Every slot draws its row first, then the channel decision, from
        // the block's generator.
        let params = SimulationParameters {
            nblocks: 1,
            channel: ChannelKind::Iid { erasure: 0.3 },
            ..small_params()
        };
        let sim = Simulation::new(&params, 21).unwrap();
        let mut run = sim.clone().with_decoder(CountingDecoder::default());
        let result = run.run().unwrap();

        let mut rng = StdRng::seed_from_u64(block_seed(21, 0));
        let mut channel = params.channel.build().unwrap().unwrap();
        channel.reset(&mut rng);
        let mut delivered = 0;
        for _ in 0..params.n_slots() {
            sim.rowgen.generate_row(&mut rng).unwrap();
            if channel.step(&mut rng) {
                delivered += 1;
            }
        }

        assert_eq!(run.decoder.rows, delivered);
        assert_eq!(result.drop_count as usize, params.n_slots() - delivered);
    }
}
