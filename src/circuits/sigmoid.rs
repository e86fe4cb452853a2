//! Sigmoid classifier over a lookup table. Public: Z (value domain), Label.
//!
//! Z is floored into the lookup domain, its sign split off, the magnitude
//! saturated to the table's last index and looked up; `1 - sigmoid` is
//! recovered for negative inputs and compared against one half. The circuit
//! is satisfiable only when that prediction equals the label.

use curve25519_dalek::Scalar;

use crate::{
    circuit::{Builder, Circuit, LinearCombination, Variable},
    error::CircuitError,
    fixed_point::Precision,
    lookup::LookupTable,
    scalar::{from_i128, pow2},
};

use super::CircuitSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigmoidWitness {
    pub z: i128,
    pub label: u8,
}

impl SigmoidWitness {
    pub fn public_inputs(&self) -> Vec<Scalar> {
        vec![from_i128(self.z), Scalar::from(self.label)]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SigmoidClassifierCircuit<'t> {
    pub precision: Precision,
    pub table: &'t LookupTable,
}

impl SigmoidClassifierCircuit<'_> {
    /// The prediction the circuit computes, evaluated directly.
    pub fn predict(&self, z: i128) -> u8 {
        let z_in = z >> self.precision.lookup_shift();
        let index = z_in.unsigned_abs().min(self.table.max_index() as u128) as usize;
        let lut = self.table.get(index).unwrap_or(0);
        let value = if z_in < 0 {
            (1u64 << self.precision.output_bits) - lut
        } else {
            lut
        };
        (value >= 1 << (self.precision.output_bits - 1)) as u8
    }
}

impl Circuit for SigmoidClassifierCircuit<'_> {
    type Witness = SigmoidWitness;

    fn spec(&self) -> CircuitSpec {
        CircuitSpec::SigmoidClassifier
    }

    fn define(&self, api: &mut Builder, witness: Option<&SigmoidWitness>) -> Result<(), CircuitError> {
        let p = &self.precision;
        let z: LinearCombination = api.public_input("z", witness.map(|w| from_i128(w.z)))?.into();
        let label: LinearCombination = api
            .public_input("label", witness.map(|w| Scalar::from(w.label)))?
            .into();
        let one = LinearCombination::from(Variable::One);

        let z_in = api.div_floor_pow2("z rescale", &z, p.lookup_shift(), p.range_bits)?;
        let negative = api.is_negative("z sign", &z_in, p.range_bits)?;
        let abs = api.select(&negative, &-z_in.clone(), &z_in)?;

        let max_index = LinearCombination::from_u64(self.table.max_index());
        let saturated = api.is_less("saturation", &max_index, &abs, p.range_bits)?;
        let index = api.select(&saturated, &max_index, &abs)?;

        let lut = api.lookup(self.table, &index)?;
        let one_out = LinearCombination::constant(pow2(p.output_bits));
        let value = api.select(&negative, &(one_out - lut.clone()), &lut)?;

        let half = LinearCombination::constant(pow2(p.output_bits - 1));
        let below_half = api.is_less("threshold", &value, &half, p.output_bits + 2)?;
        let prediction = one - below_half;

        api.assert_equal("prediction == label", prediction, label);
        Ok(())
    }
}
