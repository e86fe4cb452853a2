//! Sums per-chunk correct counts and asserts the total reaches a threshold
//! fixed at compile time. Public: Counts[C].

use curve25519_dalek::Scalar;

use crate::{
    circuit::{Builder, Circuit, LinearCombination},
    error::CircuitError,
};

use super::CircuitSpec;

/// Width each count is range checked to.
pub const COUNT_BITS: u32 = 32;
const TOTAL_BITS: u32 = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorWitness {
    pub counts: Vec<u64>,
}

impl AggregatorWitness {
    pub fn public_inputs(&self) -> Vec<Scalar> {
        self.counts.iter().map(|&c| Scalar::from(c)).collect()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AggregatorCircuit {
    pub chunks: usize,
    pub threshold: u64,
}

impl AggregatorCircuit {
    pub fn meets_threshold(&self, witness: &AggregatorWitness) -> bool {
        witness.total() >= self.threshold
    }
}

impl Circuit for AggregatorCircuit {
    type Witness = AggregatorWitness;

    fn spec(&self) -> CircuitSpec {
        CircuitSpec::Aggregator {
            chunks: self.chunks,
            threshold: self.threshold,
        }
    }

    fn define(
        &self,
        api: &mut Builder,
        witness: Option<&AggregatorWitness>,
    ) -> Result<(), CircuitError> {
        if let Some(w) = witness {
            if w.counts.len() != self.chunks {
                return Err(CircuitError::WitnessLength {
                    label: "chunk counts",
                    expected: self.chunks,
                    found: w.counts.len(),
                });
            }
        }

        let mut total = LinearCombination::zero();
        for i in 0..self.chunks {
            let count: LinearCombination = api
                .public_input("count", witness.map(|w| Scalar::from(w.counts[i])))?
                .into();
            api.to_bits("count range", &count, COUNT_BITS)?;
            total = total + count;
        }

        let threshold = LinearCombination::from_u64(self.threshold);
        let order = api.cmp("total vs threshold", &total, &threshold, TOTAL_BITS)?;
        let below = api.is_zero(
            "total vs threshold",
            &(order + LinearCombination::from_u64(1)),
        )?;
        api.assert_equal("total >= threshold", below, LinearCombination::zero());
        Ok(())
    }
}
