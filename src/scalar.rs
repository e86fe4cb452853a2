use std::cmp::Ordering;

use curve25519_dalek::Scalar;

pub fn from_i64(x: i64) -> Scalar {
    from_i128(x as i128)
}

pub fn from_i128(x: i128) -> Scalar {
    let x_abs = x.unsigned_abs();
    if x < 0 {
        -Scalar::from(x_abs)
    } else {
        Scalar::from(x_abs)
    }
}

/// `2^k` as a field element.
pub fn pow2(k: u32) -> Scalar {
    if k < 128 {
        return Scalar::from(1u128 << k);
    }
    let mut acc = Scalar::from(1u128 << 127);
    for _ in 127..k {
        acc += acc;
    }
    acc
}

/// `(l - 1) / 2`, the largest element treated as non-negative.
pub fn field_midpoint() -> Scalar {
    -Scalar::from(2u8).invert()
}

fn cmp_canonical(a: &Scalar, b: &Scalar) -> Ordering {
    let (a, b) = (a.to_bytes(), b.to_bytes());
    a.iter().rev().cmp(b.iter().rev())
}

/// Field-midpoint sign test: elements above `(l - 1) / 2` are the
/// representatives of negative integers.
pub fn is_negative(x: &Scalar) -> bool {
    cmp_canonical(x, &field_midpoint()) == Ordering::Greater
}

/// Reads a canonical element as an unsigned integer if it is below `2^128`.
pub fn to_u128(x: &Scalar) -> Option<u128> {
    let bytes = x.to_bytes();
    if bytes[16..].iter().any(|&b| b != 0) {
        return None;
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&bytes[..16]);
    Some(u128::from_le_bytes(low))
}

/// Signed reading of a field element. `None` when the magnitude does not fit.
pub fn to_i128(x: &Scalar) -> Option<i128> {
    if is_negative(x) {
        let magnitude = to_u128(&-x)?;
        if magnitude > i128::MAX as u128 + 1 {
            return None;
        }
        Some((magnitude as i128).wrapping_neg())
    } else {
        i128::try_from(to_u128(x)?).ok()
    }
}
