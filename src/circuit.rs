//! Constraint authoring: linear combinations over circuit variables and the
//! [`Builder`] that records rank-1 constraints or checks them against values.
//!
//! A circuit is a pure description ([`Circuit::define`]) run twice: once in
//! compile mode, where only the constraint shape is recorded, and once per
//! witness in assign mode, where hint values are computed and every
//! constraint is evaluated.

use std::ops::{Add, Mul, Neg, Sub};

use curve25519_dalek::Scalar;
use serde::{Deserialize, Serialize};

use crate::{circuits::CircuitSpec, error::CircuitError, lookup::LookupTable, scalar};

pub type Id = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Variable {
    One,
    Input(Id),
    Aux(Id),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinearCombination {
    terms: Vec<(Variable, Scalar)>,
}

impl LinearCombination {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn constant(value: Scalar) -> Self {
        Self {
            terms: vec![(Variable::One, value)],
        }
    }

    pub fn from_i64(value: i64) -> Self {
        Self::constant(scalar::from_i64(value))
    }

    pub fn from_u64(value: u64) -> Self {
        Self::constant(Scalar::from(value))
    }

    pub fn terms(&self) -> &[(Variable, Scalar)] {
        &self.terms
    }

    /// Only the constant term survives compaction.
    pub fn is_constant(&self) -> bool {
        self.terms.iter().all(|(var, _)| *var == Variable::One)
    }

    pub fn constant_value(&self) -> Scalar {
        self.terms
            .iter()
            .filter(|(var, _)| *var == Variable::One)
            .map(|(_, coeff)| *coeff)
            .sum()
    }

    pub fn scale(mut self, factor: Scalar) -> Self {
        for (_, coeff) in self.terms.iter_mut() {
            *coeff *= factor;
        }
        self
    }

    /// Merges duplicate variables and drops zero coefficients.
    pub fn compact(mut self) -> Self {
        self.terms.sort_by_key(|(var, _)| *var);
        let mut merged: Vec<(Variable, Scalar)> = Vec::with_capacity(self.terms.len());
        for (var, coeff) in self.terms {
            match merged.last_mut() {
                Some((last, acc)) if *last == var => *acc += coeff,
                _ => merged.push((var, coeff)),
            }
        }
        merged.retain(|(_, coeff)| *coeff != Scalar::ZERO);
        Self { terms: merged }
    }
}

impl From<Variable> for LinearCombination {
    fn from(var: Variable) -> Self {
        Self {
            terms: vec![(var, Scalar::ONE)],
        }
    }
}

impl Add for LinearCombination {
    type Output = LinearCombination;

    fn add(mut self, rhs: LinearCombination) -> LinearCombination {
        self.terms.extend(rhs.terms);
        self
    }
}

impl Sub for LinearCombination {
    type Output = LinearCombination;

    fn sub(self, rhs: LinearCombination) -> LinearCombination {
        self + (-rhs)
    }
}

impl Neg for LinearCombination {
    type Output = LinearCombination;

    fn neg(self) -> LinearCombination {
        self.scale(-Scalar::ONE)
    }
}

impl Mul<Scalar> for LinearCombination {
    type Output = LinearCombination;

    fn mul(self, rhs: Scalar) -> LinearCombination {
        self.scale(rhs)
    }
}

/// `a * b = c`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub a: LinearCombination,
    pub b: LinearCombination,
    pub c: LinearCombination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Compile,
    Assign,
}

/// Values produced by assign mode, in allocation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub inputs: Vec<Scalar>,
    pub vars: Vec<Scalar>,
}

/// A circuit description. Implementations hold configuration only; all
/// per-proof data arrives through `witness`.
pub trait Circuit {
    type Witness;

    fn spec(&self) -> CircuitSpec;

    fn define(
        &self,
        api: &mut Builder,
        witness: Option<&Self::Witness>,
    ) -> Result<(), CircuitError>;
}

pub struct Builder {
    mode: Mode,
    inputs: Vec<Scalar>,
    vars: Vec<Scalar>,
    num_inputs: usize,
    num_vars: usize,
    constraints: Vec<Constraint>,
    num_constraints: usize,
    unsatisfied: Option<(usize, &'static str)>,
}

impl Builder {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            inputs: vec![],
            vars: vec![],
            num_inputs: 0,
            num_vars: 0,
            constraints: vec![],
            num_constraints: 0,
            unsatisfied: None,
        }
    }

    pub fn num_constraints(&self) -> usize {
        self.num_constraints
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    /// The value of `lc` under the current assignment; `None` in compile mode.
    pub fn value(&self, lc: &LinearCombination) -> Option<Scalar> {
        if self.mode == Mode::Compile {
            return None;
        }
        Some(
            lc.terms
                .iter()
                .map(|(var, coeff)| {
                    coeff
                        * match *var {
                            Variable::One => Scalar::ONE,
                            Variable::Input(id) => self.inputs[id],
                            Variable::Aux(id) => self.vars[id],
                        }
                })
                .sum(),
        )
    }

    fn checked(&self, value: Option<Scalar>, label: &'static str) -> Result<Scalar, CircuitError> {
        match (self.mode, value) {
            (Mode::Compile, _) => Ok(Scalar::ZERO),
            (Mode::Assign, Some(value)) => Ok(value),
            (Mode::Assign, None) => Err(CircuitError::MissingAssignment(label)),
        }
    }

    pub fn public_input(
        &mut self,
        label: &'static str,
        value: Option<Scalar>,
    ) -> Result<Variable, CircuitError> {
        let value = self.checked(value, label)?;
        if self.mode == Mode::Assign {
            self.inputs.push(value);
        }
        self.num_inputs += 1;
        Ok(Variable::Input(self.num_inputs - 1))
    }

    /// Allocates a private variable: a private input or a prover hint.
    pub fn private(
        &mut self,
        label: &'static str,
        value: Option<Scalar>,
    ) -> Result<Variable, CircuitError> {
        let value = self.checked(value, label)?;
        if self.mode == Mode::Assign {
            self.vars.push(value);
        }
        self.num_vars += 1;
        Ok(Variable::Aux(self.num_vars - 1))
    }

    pub fn enforce(
        &mut self,
        label: &'static str,
        a: LinearCombination,
        b: LinearCombination,
        c: LinearCombination,
    ) {
        match self.mode {
            Mode::Compile => self.constraints.push(Constraint {
                a: a.compact(),
                b: b.compact(),
                c: c.compact(),
            }),
            Mode::Assign => {
                let ok = self.value(&a).zip(self.value(&b)).zip(self.value(&c));
                if let Some(((a, b), c)) = ok {
                    if a * b != c && self.unsatisfied.is_none() {
                        self.unsatisfied = Some((self.num_constraints, label));
                    }
                }
            }
        }
        self.num_constraints += 1;
    }

    pub fn assert_equal(&mut self, label: &'static str, a: LinearCombination, b: LinearCombination) {
        self.enforce(
            label,
            a - b,
            LinearCombination::from(Variable::One),
            LinearCombination::zero(),
        );
    }

    pub fn assert_boolean(&mut self, label: &'static str, x: LinearCombination) {
        let x_minus_one = x.clone() - LinearCombination::from(Variable::One);
        self.enforce(label, x, x_minus_one, LinearCombination::zero());
    }

    pub fn into_constraints(self) -> Vec<Constraint> {
        self.constraints
    }

    pub fn into_assignment(self) -> Result<Assignment, CircuitError> {
        if let Some((index, label)) = self.unsatisfied {
            return Err(CircuitError::Unsatisfied { index, label });
        }
        Ok(Assignment {
            inputs: self.inputs,
            vars: self.vars,
        })
    }
}

/// The arithmetic, comparison and lookup operations circuits are written in.
impl Builder {
    pub fn mul(
        &mut self,
        a: &LinearCombination,
        b: &LinearCombination,
    ) -> Result<LinearCombination, CircuitError> {
        if a.is_constant() {
            return Ok(b.clone().scale(a.constant_value()));
        }
        if b.is_constant() {
            return Ok(a.clone().scale(b.constant_value()));
        }
        let value = self.value(a).zip(self.value(b)).map(|(a, b)| a * b);
        let out = self.private("mul", value)?;
        self.enforce("mul", a.clone(), b.clone(), out.into());
        Ok(out.into())
    }

    /// Exact field division: multiplication by the inverse of `k`.
    pub fn div_const(&self, a: &LinearCombination, k: Scalar) -> LinearCombination {
        a.clone().scale(k.invert())
    }

    /// Decomposes `x` into `n` little-endian booleans; unsatisfiable unless
    /// `0 <= x < 2^n`.
    pub fn to_bits(
        &mut self,
        label: &'static str,
        x: &LinearCombination,
        n: u32,
    ) -> Result<Vec<Variable>, CircuitError> {
        let value = match self.value(x) {
            Some(v) => Some(
                scalar::to_u128(&v)
                    .filter(|v| n >= 128 || *v >> n == 0)
                    .ok_or(CircuitError::OutOfRange { label, bits: n })?,
            ),
            None => None,
        };
        let mut bits = Vec::with_capacity(n as usize);
        let mut recomposed = LinearCombination::zero();
        for i in 0..n {
            let bit = self.private(label, value.map(|v| Scalar::from(((v >> i) & 1) as u8)))?;
            self.assert_boolean(label, bit.into());
            recomposed = recomposed + LinearCombination::from(bit).scale(scalar::pow2(i));
            bits.push(bit);
        }
        self.assert_equal(label, recomposed, x.clone());
        Ok(bits)
    }

    /// Signed-compare capability: 1 if `x` is the representative of a
    /// negative integer, else 0. Requires `|x| < 2^(bits - 1)`, which is the
    /// field-midpoint test restricted to the safe domain.
    pub fn is_negative(
        &mut self,
        label: &'static str,
        x: &LinearCombination,
        bits: u32,
    ) -> Result<LinearCombination, CircuitError> {
        let shifted = x.clone() + LinearCombination::constant(scalar::pow2(bits - 1));
        let decomposed = self.to_bits(label, &shifted, bits)?;
        let top = decomposed[bits as usize - 1];
        Ok(LinearCombination::from(Variable::One) - top.into())
    }

    /// 1 if `a < b`, else 0.
    pub fn is_less(
        &mut self,
        label: &'static str,
        a: &LinearCombination,
        b: &LinearCombination,
        bits: u32,
    ) -> Result<LinearCombination, CircuitError> {
        self.is_negative(label, &(a.clone() - b.clone()), bits)
    }

    /// Three-way compare: -1, 0 or 1.
    pub fn cmp(
        &mut self,
        label: &'static str,
        a: &LinearCombination,
        b: &LinearCombination,
        bits: u32,
    ) -> Result<LinearCombination, CircuitError> {
        let diff = a.clone() - b.clone();
        let negative = self.is_negative(label, &diff, bits)?;
        let zero = self.is_zero(label, &diff)?;
        Ok(LinearCombination::from(Variable::One) - negative.scale(Scalar::from(2u8)) - zero)
    }

    /// 1 if `x == 0`, else 0.
    pub fn is_zero(
        &mut self,
        label: &'static str,
        x: &LinearCombination,
    ) -> Result<LinearCombination, CircuitError> {
        let value = self.value(x);
        let inverse = self.private(
            label,
            value.map(|v| if v == Scalar::ZERO { Scalar::ZERO } else { v.invert() }),
        )?;
        let out = self.private(
            label,
            value.map(|v| if v == Scalar::ZERO { Scalar::ONE } else { Scalar::ZERO }),
        )?;
        let one = LinearCombination::from(Variable::One);
        self.enforce(
            label,
            x.clone(),
            inverse.into(),
            one - LinearCombination::from(out),
        );
        self.enforce(label, x.clone(), out.into(), LinearCombination::zero());
        Ok(out.into())
    }

    /// `cond ? a : b` for a boolean `cond`.
    pub fn select(
        &mut self,
        cond: &LinearCombination,
        a: &LinearCombination,
        b: &LinearCombination,
    ) -> Result<LinearCombination, CircuitError> {
        let picked = self.mul(cond, &(a.clone() - b.clone()))?;
        Ok(b.clone() + picked)
    }

    /// Floor division by `2^shift`: `x = q * 2^shift + r` with `r` in
    /// `[0, 2^shift)` and `|q| < 2^(bits - 1)`.
    pub fn div_floor_pow2(
        &mut self,
        label: &'static str,
        x: &LinearCombination,
        shift: u32,
        bits: u32,
    ) -> Result<LinearCombination, CircuitError> {
        let split = match self.value(x) {
            Some(v) => {
                let v = scalar::to_i128(&v).ok_or(CircuitError::OutOfRange { label, bits })?;
                Some((v >> shift, v & ((1i128 << shift) - 1)))
            }
            None => None,
        };
        let q = self.private(label, split.map(|(q, _)| scalar::from_i128(q)))?;
        let r = self.private(label, split.map(|(_, r)| scalar::from_i128(r)))?;
        self.to_bits(label, &r.into(), shift)?;
        let q_shifted =
            LinearCombination::from(q) + LinearCombination::constant(scalar::pow2(bits - 1));
        self.to_bits(label, &q_shifted, bits)?;
        self.assert_equal(
            label,
            LinearCombination::from(q).scale(scalar::pow2(shift)) + r.into(),
            x.clone(),
        );
        Ok(q.into())
    }

    /// Table lookup through a multiplexer tree over the index bits. Indices
    /// past the last entry read the zero padding; callers saturate first.
    pub fn lookup(
        &mut self,
        table: &LookupTable,
        index: &LinearCombination,
    ) -> Result<LinearCombination, CircuitError> {
        let bits = self.to_bits("lookup index", index, table.index_bits())?;
        let mut layer: Vec<LinearCombination> = table
            .padded_entries()
            .map(LinearCombination::from_u64)
            .collect();
        for bit in bits {
            let bit = LinearCombination::from(bit);
            let mut next = Vec::with_capacity(layer.len() / 2);
            for pair in layer.chunks(2) {
                next.push(self.select(&bit, &pair[1], &pair[0])?);
            }
            layer = next;
        }
        Ok(layer.swap_remove(0))
    }
}
