//! Parallel Reduction
//!
//! Splits a simulation's blocks across worker threads and merges the
//! partition results.
//!
//! Each worker owns a full copy of the simulation (row generator, channel,
//! decoder) restricted to its share of blocks, so workers share no mutable
//! state. Blocks are seeded by their global index, so the merged counts do
//! not depend on the worker count. Workers are threads of one process;
//! separate `uep-sim` processes share only the CDF cache.
//!
//! ```text
//! nblocks = 10, workers = 4
//!
//! worker 0: blocks 0..3
//! worker 1: blocks 3..6
//! worker 2: blocks 6..8
//! worker 3: blocks 8..10
//! ```

use std::time::Instant;

use rayon::prelude::*;
use tracing::info;

use uep_core::{Decoder, UepError, UepResult};

use crate::simulation::{AggregateResult, Simulation};

/// Runs simulations on a pool of worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelReducer {
    workers: usize,
}

impl Default for ParallelReducer {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ParallelReducer {
    /// Reducer with `workers` threads; 0 means one per available CPU.
    pub fn new(workers: usize) -> Self {
        let workers = if workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            workers
        };
        Self { workers }
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run all blocks of `sim` and merge the partition results.
    ///
    /// The first failing partition aborts the reduction; no partial result
    /// is returned.
    pub fn run<D>(&self, sim: &Simulation<D>) -> UepResult<AggregateResult>
    where
        D: Decoder + Clone,
    {
        let shares = split_blocks(sim.nblocks(), self.workers);
        let sizes: Vec<usize> = shares.iter().map(|&(_, n)| n).collect();
        info!(
            workers = shares.len(),
            nblocks = sim.nblocks(),
            split = ?sizes,
            "starting parallel simulation"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(shares.len().max(1))
            .thread_name(|i| format!("uep-worker-{i}"))
            .build()
            .map_err(|e| UepError::Worker(e.to_string()))?;

        let copies: Vec<Simulation<D>> = shares
            .iter()
            .map(|&(first, count)| sim.partition(sim.first_block() + first, count))
            .collect();

        let started = Instant::now();
        let parts = pool.install(|| {
            copies
                .into_par_iter()
                .map(|mut part| part.run())
                .collect::<UepResult<Vec<_>>>()
        })?;

        let result = AggregateResult::merge(&parts)?;
        info!(
            nblocks = result.nblocks,
            elapsed_ms = started.elapsed().as_millis() as u64,
            error_rates = ?result.error_rates,
            drop_rate = result.drop_rate,
            "parallel simulation complete"
        );
        Ok(result)
    }
}

/// Split `nblocks` into at most `workers` contiguous `(first, count)` ranges.
///
/// Shares differ by at most one block, the larger ones first. Workers that
/// would get no block are left out.
pub fn split_blocks(nblocks: usize, workers: usize) -> Vec<(usize, usize)> {
    let workers = workers.max(1);
    let base = nblocks / workers;
    let extra = nblocks % workers;

    let mut shares = Vec::with_capacity(workers);
    let mut first = 0;
    for i in 0..workers {
        let count = base + usize::from(i < extra);
        if count == 0 {
            break;
        }
        shares.push((first, count));
        first += count;
    }
    shares
}
