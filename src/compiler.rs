//! Runs a [`Circuit`] description through the [`Builder`]: compile mode
//! lowers it to an [`R1CS`], assign mode produces a checked [`Assignment`].

use tracing::debug;

use crate::{
    circuit::{Assignment, Builder, Circuit, Mode},
    error::CircuitError,
    r1cs::R1CS,
};

pub fn compile<C: Circuit>(circuit: &C) -> Result<R1CS, CircuitError> {
    let mut builder = Builder::new(Mode::Compile);
    circuit.define(&mut builder, None)?;
    let (num_vars, num_inputs) = (builder.num_vars(), builder.num_inputs());
    let r1cs = R1CS::from_constraints(&builder.into_constraints(), num_vars, num_inputs);
    debug!(
        spec = %circuit.spec(),
        num_cons = r1cs.num_cons,
        num_vars = r1cs.num_vars,
        num_inputs = r1cs.num_inputs,
        "compiled circuit"
    );
    Ok(r1cs)
}

/// Computes every variable for `witness` and checks each constraint.
pub fn assign<C: Circuit>(circuit: &C, witness: &C::Witness) -> Result<Assignment, CircuitError> {
    let mut builder = Builder::new(Mode::Assign);
    circuit.define(&mut builder, Some(witness))?;
    builder.into_assignment()
}

/// [`assign`], additionally requiring the result to fit `r1cs`.
pub fn assign_checked<C: Circuit>(
    circuit: &C,
    r1cs: &R1CS,
    witness: &C::Witness,
) -> Result<Assignment, CircuitError> {
    let assignment = assign(circuit, witness)?;
    if assignment.vars.len() != r1cs.num_vars || assignment.inputs.len() != r1cs.num_inputs {
        return Err(CircuitError::ShapeMismatch {
            expected_vars: r1cs.num_vars,
            expected_inputs: r1cs.num_inputs,
            found_vars: assignment.vars.len(),
            found_inputs: assignment.inputs.len(),
        });
    }
    Ok(assignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        circuits::{
            AggregatorCircuit, AggregatorWitness, LinearCircuit, LinearWitness,
            SigmoidClassifierCircuit, SigmoidWitness,
        },
        fixed_point::{encode, Precision},
        lookup::sigmoid_table,
    };

    #[test]
    fn test_compiled_r1cs_accepts_assignment() {
        let p = Precision::default();
        let circuit = LinearCircuit { precision: p };
        let r1cs = compile(&circuit).unwrap();
        let witness = LinearWitness::honest(
            encode(-0.85735312, p.value_bits),
            encode(50.94705066, p.value_bits),
            encode(61.0, p.value_bits),
            &p,
        )
        .unwrap();
        let assignment = assign_checked(&circuit, &r1cs, &witness).unwrap();
        assert_eq!(assignment.inputs, witness.public_inputs());
        assert!(r1cs.is_sat(&assignment).unwrap());
    }

    #[test]
    fn test_compile_is_deterministic() {
        let p = Precision::default();
        let table = sigmoid_table(&p, 8);
        let circuit = SigmoidClassifierCircuit {
            precision: p,
            table: &table,
        };
        let first = compile(&circuit).unwrap();
        let second = compile(&circuit).unwrap();
        assert_eq!(first.digest(), second.digest());
        assert_eq!(first.num_inputs, 2);

        let assignment = assign_checked(&circuit, &first, &SigmoidWitness { z: 5, label: 1 }).unwrap();
        assert!(first.is_sat(&assignment).unwrap());
    }

    #[test]
    fn test_shape_mismatch() {
        let small = compile(&AggregatorCircuit {
            chunks: 2,
            threshold: 3,
        })
        .unwrap();
        let large = AggregatorCircuit {
            chunks: 3,
            threshold: 3,
        };
        let err = assign_checked(&large, &small, &AggregatorWitness { counts: vec![1, 1, 1] })
            .unwrap_err();
        assert!(matches!(err, CircuitError::ShapeMismatch { .. }));
        assert!(!err.is_infeasible());
    }
}
