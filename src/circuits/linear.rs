//! `Z = W * X + B` in fixed point. Public: X, Z. Private: W, B.

use curve25519_dalek::Scalar;

use crate::{
    circuit::{Builder, Circuit, LinearCombination},
    error::CircuitError,
    fixed_point::{scaled_add, scaled_multiply, Precision},
    scalar::from_i128,
};

use super::CircuitSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearWitness {
    pub w: i128,
    pub b: i128,
    pub x: i128,
    pub z: i128,
}

impl LinearWitness {
    /// Witness with `Z` computed off circuit by the same fixed-point rules.
    pub fn honest(w: i128, b: i128, x: i128, precision: &Precision) -> Result<Self, CircuitError> {
        let z = scaled_multiply(w, x, precision.value_bits)
            .and_then(|wx| scaled_add(wx, b))
            .ok_or(CircuitError::Overflow("z = w * x + b"))?;
        Ok(Self { w, b, x, z })
    }

    pub fn public_inputs(&self) -> Vec<Scalar> {
        vec![from_i128(self.x), from_i128(self.z)]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LinearCircuit {
    pub precision: Precision,
}

impl Circuit for LinearCircuit {
    type Witness = LinearWitness;

    fn spec(&self) -> CircuitSpec {
        CircuitSpec::Linear
    }

    fn define(&self, api: &mut Builder, witness: Option<&LinearWitness>) -> Result<(), CircuitError> {
        let x: LinearCombination = api.public_input("x", witness.map(|w| from_i128(w.x)))?.into();
        let z: LinearCombination = api.public_input("z", witness.map(|w| from_i128(w.z)))?.into();
        let w: LinearCombination = api.private("w", witness.map(|w| from_i128(w.w)))?.into();
        let b: LinearCombination = api.private("b", witness.map(|w| from_i128(w.b)))?.into();

        let product = api.mul(&w, &x)?;
        let wx = api.div_floor_pow2(
            "w * x rescale",
            &product,
            self.precision.value_bits,
            self.precision.range_bits,
        )?;
        api.assert_equal("z == w * x + b", wx + b, z);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;
    use crate::{compiler::assign, fixed_point::encode};

    fn circuit() -> LinearCircuit {
        LinearCircuit {
            precision: Precision::default(),
        }
    }

    #[test]
    fn test_honest_z_satisfies() {
        let p = Precision::default();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let w = encode(rng.gen_range(-5.0..5.0), p.value_bits);
            let b = encode(rng.gen_range(-100.0..100.0), p.value_bits);
            let x = encode(rng.gen_range(-100.0..100.0), p.value_bits);
            let witness = LinearWitness::honest(w, b, x, &p).unwrap();
            assert!(assign(&circuit(), &witness).is_ok(), "{witness:?}");
        }
    }

    #[test]
    fn test_other_z_violates() {
        let p = Precision::default();
        let w = encode(-0.85735312, p.value_bits);
        let b = encode(50.94705066, p.value_bits);
        let x = encode(42.0, p.value_bits);
        let honest = LinearWitness::honest(w, b, x, &p).unwrap();
        for delta in [1i128, -1, 1 << 32, -(1 << 40)] {
            let forged = LinearWitness {
                z: honest.z + delta,
                ..honest
            };
            let err = assign(&circuit(), &forged).unwrap_err();
            assert!(err.is_infeasible());
        }
    }

    #[test]
    fn test_overflowing_feature_is_a_witness_error() {
        let p = Precision::default();
        let w = encode(-0.85735312, p.value_bits);
        let b = encode(50.94705066, p.value_bits);
        for x in [1e20, f64::INFINITY, f64::NEG_INFINITY] {
            let err = LinearWitness::honest(w, b, encode(x, p.value_bits), &p).unwrap_err();
            assert!(matches!(err, CircuitError::Overflow(_)));
            assert!(!err.is_infeasible());
        }
    }

    #[test]
    fn test_z_beyond_signed_range_is_infeasible() {
        // fits i128 but not the 64-bit signed domain of the circuit
        let p = Precision::default();
        let witness = LinearWitness::honest(encode(1.0, 32), 0, encode(1e12, 32), &p).unwrap();
        assert!(!p.in_range(witness.z));
        assert!(assign(&circuit(), &witness).unwrap_err().is_infeasible());
    }
}
