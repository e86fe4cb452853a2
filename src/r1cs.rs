use curve25519_dalek::Scalar;
use libspartan::{Instance, InputsAssignment, VarsAssignment};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    circuit::{Assignment, Constraint, LinearCombination, Variable},
    error::BackendError,
};

pub type Entry = (usize, usize, [u8; 32]);

/// Sparse `A`, `B`, `C` matrices in Spartan's column layout: variables in
/// `[0, num_vars)`, the constant one at `num_vars`, then the public inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct R1CS {
    pub num_cons: usize,
    pub num_vars: usize,
    pub num_inputs: usize,
    pub a: Vec<Entry>,
    pub b: Vec<Entry>,
    pub c: Vec<Entry>,
}

impl R1CS {
    pub fn from_constraints(constraints: &[Constraint], num_vars: usize, num_inputs: usize) -> Self {
        let column = |var: &Variable| match *var {
            Variable::Aux(id) => id,
            Variable::One => num_vars,
            Variable::Input(id) => num_vars + 1 + id,
        };
        let row = |i: usize, lc: &LinearCombination, out: &mut Vec<Entry>| {
            for (var, coeff) in lc.terms() {
                out.push((i, column(var), coeff.to_bytes()));
            }
        };

        let (mut a, mut b, mut c) = (vec![], vec![], vec![]);
        for (i, constraint) in constraints.iter().enumerate() {
            row(i, &constraint.a, &mut a);
            row(i, &constraint.b, &mut b);
            row(i, &constraint.c, &mut c);
        }
        Self {
            num_cons: constraints.len(),
            num_vars,
            num_inputs,
            a,
            b,
            c,
        }
    }

    pub fn num_non_zero_entries(&self) -> usize {
        self.a.len().max(self.b.len()).max(self.c.len())
    }

    pub fn instance(&self) -> Result<Instance, BackendError> {
        Instance::new(
            self.num_cons,
            self.num_vars,
            self.num_inputs,
            &self.a,
            &self.b,
            &self.c,
        )
        .map_err(|err| BackendError::Instance(format!("{err:?}")))
    }

    /// SHA-256 over the shape and every matrix entry.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for n in [self.num_cons, self.num_vars, self.num_inputs] {
            hasher.update((n as u64).to_le_bytes());
        }
        for matrix in [&self.a, &self.b, &self.c] {
            hasher.update((matrix.len() as u64).to_le_bytes());
            for (row, col, value) in matrix {
                hasher.update((*row as u64).to_le_bytes());
                hasher.update((*col as u64).to_le_bytes());
                hasher.update(value);
            }
        }
        hasher.finalize().into()
    }

    pub fn is_sat(&self, assignment: &Assignment) -> Result<bool, BackendError> {
        let (vars, inputs) = spartan_assignment(assignment)?;
        self.instance()?
            .is_sat(&vars, &inputs)
            .map_err(|err| BackendError::Assignment(format!("{err:?}")))
    }
}

fn to_bytes(values: &[Scalar]) -> Vec<[u8; 32]> {
    values.iter().map(Scalar::to_bytes).collect()
}

pub fn spartan_inputs(inputs: &[Scalar]) -> Result<InputsAssignment, BackendError> {
    InputsAssignment::new(&to_bytes(inputs))
        .map_err(|err| BackendError::Assignment(format!("{err:?}")))
}

pub fn spartan_assignment(
    assignment: &Assignment,
) -> Result<(VarsAssignment, InputsAssignment), BackendError> {
    let vars = VarsAssignment::new(&to_bytes(&assignment.vars))
        .map_err(|err| BackendError::Assignment(format!("{err:?}")))?;
    Ok((vars, spartan_inputs(&assignment.inputs)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        circuit::{Builder, Mode},
        scalar::from_i64,
    };

    // v0 = i0 * i0, v0 + 3 = i1
    fn square_plus_three(api: &mut Builder, x: Option<i64>) {
        let x: LinearCombination = api.public_input("x", x.map(from_i64)).unwrap().into();
        let y_value = api.value(&x).map(|v| v * v + Scalar::from(3u8));
        let y: LinearCombination = api.public_input("y", y_value).unwrap().into();
        let sq = api.mul(&x, &x).unwrap();
        api.assert_equal("y", sq + LinearCombination::from_u64(3), y);
    }

    fn build(x: Option<i64>) -> (R1CS, Option<Assignment>) {
        let mut compile = Builder::new(Mode::Compile);
        square_plus_three(&mut compile, None);
        let (nv, ni) = (compile.num_vars(), compile.num_inputs());
        let r1cs = R1CS::from_constraints(&compile.into_constraints(), nv, ni);
        let assignment = x.map(|x| {
            let mut assign = Builder::new(Mode::Assign);
            square_plus_three(&mut assign, Some(x));
            assign.into_assignment().unwrap()
        });
        (r1cs, assignment)
    }

    #[test]
    fn test_layout() {
        let (r1cs, _) = build(None);
        assert_eq!(r1cs.num_cons, 2);
        assert_eq!(r1cs.num_vars, 1);
        assert_eq!(r1cs.num_inputs, 2);
        // mul row: i0 * i0 = v0
        assert_eq!(r1cs.a[0], (0, 2, Scalar::ONE.to_bytes()));
        assert_eq!(r1cs.b[0], (0, 2, Scalar::ONE.to_bytes()));
        assert_eq!(r1cs.c[0], (0, 0, Scalar::ONE.to_bytes()));
        r1cs.instance().unwrap();
    }

    #[test]
    fn test_is_sat() {
        let (r1cs, assignment) = build(Some(-7));
        let mut assignment = assignment.unwrap();
        assert_eq!(assignment.inputs[1], Scalar::from(52u8));
        assert!(r1cs.is_sat(&assignment).unwrap());

        assignment.inputs[1] = Scalar::from(53u8);
        assert!(!r1cs.is_sat(&assignment).unwrap());
    }

    #[test]
    fn test_digest_changes_with_entries() {
        let (r1cs, _) = build(None);
        let mut other = r1cs.clone();
        other.c[0].2 = Scalar::from(2u8).to_bytes();
        assert_ne!(r1cs.digest(), other.digest());
        assert_eq!(r1cs.digest(), build(None).0.digest());
    }
}
