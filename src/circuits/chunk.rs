//! Counts correct, eligible predictions over a fixed-size chunk of samples.
//!
//! Public: X[N], Label[N], Count. Private: W, B. Each sample's Z is
//! recomputed in circuit; the prediction is Z's sign at full precision and a
//! sample is eligible when its lookup-domain magnitude reaches the margin.
//! Count must equal the number of eligible samples predicted correctly.

use curve25519_dalek::Scalar;

use crate::{
    circuit::{Builder, Circuit, LinearCombination, Variable},
    error::CircuitError,
    fixed_point::{scaled_add, scaled_multiply, Precision},
    scalar::from_i128,
};

use super::CircuitSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleVerdict {
    pub prediction: u8,
    pub eligible: bool,
}

impl SampleVerdict {
    pub fn counts_as_correct(&self, label: u8) -> bool {
        self.eligible && self.prediction == label
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkWitness {
    pub w: i128,
    pub b: i128,
    pub xs: Vec<i128>,
    pub labels: Vec<u8>,
    pub count: u64,
}

impl ChunkWitness {
    pub fn public_inputs(&self) -> Vec<Scalar> {
        self.xs
            .iter()
            .map(|&x| from_i128(x))
            .chain(self.labels.iter().map(|&l| Scalar::from(l)))
            .chain(std::iter::once(Scalar::from(self.count)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AccuracyChunkCircuit {
    pub precision: Precision,
    pub size: usize,
    pub margin_steps: u64,
}

impl AccuracyChunkCircuit {
    /// The per-sample rule the circuit enforces, evaluated directly.
    pub fn verdict(&self, w: i128, b: i128, x: i128) -> Result<SampleVerdict, CircuitError> {
        let p = &self.precision;
        let z = scaled_multiply(w, x, p.value_bits)
            .and_then(|wx| scaled_add(wx, b))
            .ok_or(CircuitError::Overflow("z = w * x + b"))?;
        let z_in = z >> p.lookup_shift();
        Ok(SampleVerdict {
            prediction: (z >= 0) as u8,
            eligible: z_in.unsigned_abs() >= self.margin_steps as u128,
        })
    }

    /// Off-circuit count for the aggregator's public input.
    pub fn count_correct(
        &self,
        w: i128,
        b: i128,
        xs: &[i128],
        labels: &[u8],
    ) -> Result<u64, CircuitError> {
        if xs.len() != labels.len() {
            return Err(CircuitError::WitnessLength {
                label: "chunk labels",
                expected: xs.len(),
                found: labels.len(),
            });
        }
        let mut count = 0;
        for (&x, &label) in xs.iter().zip(labels) {
            if self.verdict(w, b, x)?.counts_as_correct(label) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Witness whose count is the off-circuit recomputation.
    pub fn witness(
        &self,
        w: i128,
        b: i128,
        xs: Vec<i128>,
        labels: Vec<u8>,
    ) -> Result<ChunkWitness, CircuitError> {
        let count = self.count_correct(w, b, &xs, &labels)?;
        Ok(ChunkWitness {
            w,
            b,
            xs,
            labels,
            count,
        })
    }
}

impl Circuit for AccuracyChunkCircuit {
    type Witness = ChunkWitness;

    fn spec(&self) -> CircuitSpec {
        CircuitSpec::AccuracyChunk { size: self.size }
    }

    fn define(&self, api: &mut Builder, witness: Option<&ChunkWitness>) -> Result<(), CircuitError> {
        let p = &self.precision;
        if let Some(w) = witness {
            for (label, found) in [("chunk features", w.xs.len()), ("chunk labels", w.labels.len())] {
                if found != self.size {
                    return Err(CircuitError::WitnessLength {
                        label,
                        expected: self.size,
                        found,
                    });
                }
            }
        }

        let mut xs = Vec::with_capacity(self.size);
        for i in 0..self.size {
            let value = witness.map(|w| from_i128(w.xs[i]));
            xs.push(LinearCombination::from(api.public_input("x", value)?));
        }
        let mut labels = Vec::with_capacity(self.size);
        for i in 0..self.size {
            let value = witness.map(|w| Scalar::from(w.labels[i]));
            labels.push(LinearCombination::from(api.public_input("label", value)?));
        }
        let count: LinearCombination = api
            .public_input("count", witness.map(|w| Scalar::from(w.count)))?
            .into();
        let w: LinearCombination = api.private("w", witness.map(|w| from_i128(w.w)))?.into();
        let b: LinearCombination = api.private("b", witness.map(|w| from_i128(w.b)))?.into();

        let one = LinearCombination::from(Variable::One);
        let margin = LinearCombination::from_u64(self.margin_steps);
        let mut correct = LinearCombination::zero();

        for (x, label) in xs.iter().zip(labels) {
            let product = api.mul(&w, x)?;
            let wx = api.div_floor_pow2("w * x rescale", &product, p.value_bits, p.range_bits)?;
            let z = wx + b.clone();

            let negative = api.is_negative("z sign", &z, p.range_bits)?;
            let prediction = one.clone() - negative;

            let z_in = api.div_floor_pow2("z rescale", &z, p.lookup_shift(), p.range_bits)?;
            let negative_in = api.is_negative("z_in sign", &z_in, p.range_bits)?;
            let abs_in = api.select(&negative_in, &-z_in.clone(), &z_in)?;
            let below_margin = api.is_less("margin", &abs_in, &margin, p.range_bits)?;
            let eligible = one.clone() - below_margin;

            let matches = api.is_zero("prediction == label", &(prediction - label))?;
            correct = correct + api.mul(&eligible, &matches)?;
        }

        api.assert_equal("count", correct, count);
        Ok(())
    }
}
