//! Build-once lookup tables. A table is a plain value: the orchestration
//! layer builds it once and hands the same instance to every compile and
//! witness run of the circuit that queries it.

use crate::fixed_point::Precision;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTable {
    entries: Vec<u64>,
}

impl LookupTable {
    pub fn new(entries: Vec<u64>) -> Self {
        assert!(!entries.is_empty(), "lookup table needs at least one entry");
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<u64> {
        self.entries.get(index).copied()
    }

    pub fn max_index(&self) -> u64 {
        self.entries.len() as u64 - 1
    }

    /// Width of the index decomposition.
    pub fn index_bits(&self) -> u32 {
        usize::BITS - (self.entries.len() - 1).leading_zeros()
    }

    /// Entries followed by zeros up to `2^index_bits`.
    pub fn padded_entries(&self) -> impl Iterator<Item = u64> + '_ {
        let padding = (1usize << self.index_bits()) - self.entries.len();
        self.entries
            .iter()
            .copied()
            .chain(std::iter::repeat(0).take(padding))
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// `round(sigmoid(i / 2^lookup_bits) * 2^output_bits)` for
/// `i in 0..=max_input * 2^lookup_bits`.
pub fn sigmoid_table(precision: &Precision, max_input: u32) -> LookupTable {
    let steps = (max_input as u64) << precision.lookup_bits;
    let input_scale = (1u64 << precision.lookup_bits) as f64;
    let output_scale = (1u64 << precision.output_bits) as f64;
    LookupTable::new(
        (0..=steps)
            .map(|i| (sigmoid(i as f64 / input_scale) * output_scale).round() as u64)
            .collect(),
    )
}
