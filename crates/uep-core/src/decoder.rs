//! Message-Passing Decoding
//!
//! The simulation talks to decoders through the narrow [`Decoder`] trait:
//! `reset`, `add_output`, `run`, then read back `input_symbols` and
//! `average_ripple_size`, once per block.
//!
//! [`MessagePassingDecoder`] is a symbolic peeling decoder: it tracks which
//! source symbols are recoverable, not their payloads. Each sweep releases
//! every source symbol covered by a degree-one coded symbol (the ripple),
//! then removes the released symbols from all coded symbols that reference
//! them.
//!
//! ## Example
//!
//! ```rust
//! use uep_core::decoder::{Decoder, MessagePassingDecoder};
//! use uep_core::row_generator::Row;
//!
//! let mut decoder = MessagePassingDecoder::default();
//! decoder.reset(3);
//! for row in [vec![0], vec![0, 1], vec![1, 2]] {
//!     decoder.add_output(&row.into_iter().collect::<Row>()).unwrap();
//! }
//! decoder.run().unwrap();
//! assert!(decoder.input_symbols().iter().all(|&d| d));
//! assert_eq!(decoder.average_ripple_size(), 1.0);
//! ```

use std::collections::BTreeSet;

use crate::error::{UepError, UepResult};
use crate::row_generator::Row;

/// Decoder lifecycle used by the simulation harness.
pub trait Decoder: Send {
    /// Drop all received symbols and size the decoder for `k` source symbols.
    fn reset(&mut self, k: usize);

    /// Receive one coded symbol.
    fn add_output(&mut self, row: &Row) -> UepResult<()>;

    /// Decode as far as possible.
    fn run(&mut self) -> UepResult<()>;

    /// Recovery flag per source symbol, `k` entries.
    fn input_symbols(&self) -> &[bool];

    /// Mean ripple size of the last run.
    fn average_ripple_size(&self) -> f64;
}

/// Symbolic peeling decoder.
#[derive(Debug, Clone, Default)]
pub struct MessagePassingDecoder {
    /// Recovered source symbols.
    decoded: Vec<bool>,
    /// Unresolved neighbors of each coded symbol.
    outputs: Vec<Vec<usize>>,
    /// Coded symbols referencing each source symbol.
    edges: Vec<Vec<usize>>,
    /// Ripple size of each sweep in the last run.
    ripples: Vec<usize>,
}

impl MessagePassingDecoder {
    /// Decoder sized for `k` source symbols.
    pub fn new(k: usize) -> Self {
        let mut decoder = Self::default();
        decoder.reset(k);
        decoder
    }

    /// Number of source symbols.
    pub fn k(&self) -> usize {
        self.decoded.len()
    }

    /// Coded symbols received since the last reset.
    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Source symbols recovered so far.
    pub fn num_decoded(&self) -> usize {
        self.decoded.iter().filter(|&&d| d).count()
    }

    /// Whether every source symbol has been recovered.
    pub fn is_complete(&self) -> bool {
        self.decoded.iter().all(|&d| d)
    }

    /// Ripple size of each sweep of the last run.
    pub fn ripple_sizes(&self) -> &[usize] {
        &self.ripples
    }

    fn release(&mut self, input: usize, next: &mut Vec<usize>) {
        self.decoded[input] = true;
        for &o in &self.edges[input] {
            let neighbors = &mut self.outputs[o];
            if let Some(pos) = neighbors.iter().position(|&i| i == input) {
                neighbors.swap_remove(pos);
                if neighbors.len() == 1 {
                    next.push(o);
                }
            }
        }
    }
}

impl Decoder for MessagePassingDecoder {
    fn reset(&mut self, k: usize) {
        self.decoded.clear();
        self.decoded.resize(k, false);
        self.outputs.clear();
        self.edges.clear();
        self.edges.resize_with(k, Vec::new);
        self.ripples.clear();
    }

    fn add_output(&mut self, row: &Row) -> UepResult<()> {
        let k = self.k();
        if let Some(&bad) = row.iter().find(|&&i| i >= k) {
            return Err(UepError::Decoder(format!(
                "coded symbol references source symbol {bad}, decoder holds {k}"
            )));
        }

        let o = self.outputs.len();
        let neighbors: Vec<usize> = row.iter().copied().filter(|&i| !self.decoded[i]).collect();
        for &i in &neighbors {
            self.edges[i].push(o);
        }
        self.outputs.push(neighbors);
        Ok(())
    }

    fn run(&mut self) -> UepResult<()> {
        self.ripples.clear();

        let mut candidates: Vec<usize> = (0..self.outputs.len())
            .filter(|&o| self.outputs[o].len() == 1)
            .collect();

        while !candidates.is_empty() {
            let ripple: BTreeSet<usize> = candidates
                .iter()
                .filter_map(|&o| self.outputs[o].first().copied())
                .filter(|&i| !self.decoded[i])
                .collect();
            if ripple.is_empty() {
                break;
            }
            self.ripples.push(ripple.len());

            let mut next = Vec::new();
            for input in ripple {
                self.release(input, &mut next);
            }
            candidates = next;
        }

        Ok(())
    }

    fn input_symbols(&self) -> &[bool] {
        &self.decoded
    }

    fn average_ripple_size(&self) -> f64 {
        if self.ripples.is_empty() {
            0.0
        } else {
            self.ripples.iter().sum::<usize>() as f64 / self.ripples.len() as f64
        }
    }
}
