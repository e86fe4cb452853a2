//! Fixed-point encoding of reals as integers scaled by a power of two.
//!
//! Off-circuit arithmetic is done on `i128` with floor division, which is the
//! rule the circuits enforce through their remainder-checked division.

use serde::{Deserialize, Serialize};

/// Scale exponents for every numeric domain used by the circuits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Precision {
    /// Model values, features and `Z` (Q32 by default).
    pub value_bits: u32,
    /// Lookup-table input domain (Q10 by default).
    pub lookup_bits: u32,
    /// Sigmoid output domain (Q16 by default).
    pub output_bits: u32,
    /// Signed values must satisfy `|v| < 2^(range_bits - 1)`.
    pub range_bits: u32,
}

impl Default for Precision {
    fn default() -> Self {
        Self {
            value_bits: 32,
            lookup_bits: 10,
            output_bits: 16,
            range_bits: 64,
        }
    }
}

impl Precision {
    /// Shift that brings a value-domain number into the lookup domain.
    pub fn lookup_shift(&self) -> u32 {
        self.value_bits - self.lookup_bits
    }

    /// `|raw| < 2^(range_bits - 1)`, the domain of every signed test.
    pub fn in_range(&self, raw: i128) -> bool {
        raw.unsigned_abs() < 1u128 << (self.range_bits - 1)
    }
}

pub fn encode(x: f64, s: u32) -> i128 {
    (x * (1u128 << s) as f64).round() as i128
}

pub fn decode(i: i128, s: u32) -> f64 {
    i as f64 / (1u128 << s) as f64
}

/// `None` when `a * b` overflows `i128`.
pub fn scaled_multiply(a: i128, b: i128, s: u32) -> Option<i128> {
    a.checked_mul(b).map(|product| product >> s)
}

pub fn scaled_add(a: i128, b: i128) -> Option<i128> {
    a.checked_add(b)
}
