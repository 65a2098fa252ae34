//! Full-precision helpers over 256-bit intermediates
//!
//! `a * b / denominator` on raw 128-bit magnitudes without intermediate
//! overflow, with an explicit rounding direction. This underpins both
//! the Q64.64 multiply/divide and the proportional liquidity math in
//! the engine, where the rounding direction decides which side absorbs
//! the dust.

use crate::error::FixedPointError;
use crate::q64::Rounding;
use alloy_primitives::U256;

/// Computes `a * b / denominator` with full 256-bit precision.
///
/// Returns `DivisionByZero` when `denominator` is zero and `Overflow`
/// when the quotient does not fit in 128 bits.
pub fn mul_div(
    a: u128,
    b: u128,
    denominator: u128,
    rounding: Rounding,
) -> Result<u128, FixedPointError> {
    if denominator == 0 {
        return Err(FixedPointError::DivisionByZero);
    }

    let prod = U256::from(a) * U256::from(b);
    let den = U256::from(denominator);

    let mut quotient = prod / den;
    if rounding == Rounding::Up && prod % den != U256::ZERO {
        quotient += U256::from(1u8);
    }

    u128::try_from(quotient).map_err(|_| FixedPointError::Overflow)
}

/// Integer square root of a 256-bit value via Newton's method.
///
/// The result always fits in 128 bits for inputs below 2^256.
pub fn sqrt(n: U256) -> u128 {
    if n == U256::ZERO {
        return 0;
    }

    // Initial guess: 2^ceil(bits/2) bounds the root from above,
    // so the iteration decreases monotonically to the floor root.
    let bits = 256 - n.leading_zeros();
    let mut x = U256::from(1u8) << ((bits + 1) / 2);
    loop {
        let y = (x + n / x) >> 1;
        if y >= x {
            break;
        }
        x = y;
    }

    // x <= 2^128 - 1 because n < 2^256
    u128::try_from(x).unwrap_or(u128::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_div_simple_division() {
        assert_eq!(mul_div(10, 20, 5, Rounding::Down).unwrap(), 40);
    }

    #[test]
    fn mul_div_division_by_zero() {
        let result = mul_div(10, 20, 0, Rounding::Down);
        assert!(matches!(result, Err(FixedPointError::DivisionByZero)));
    }

    #[test]
    fn mul_div_large_multiplication_no_overflow() {
        // a * b does not fit in 128 bits but the quotient does
        let result = mul_div(u128::MAX, u128::MAX, u128::MAX, Rounding::Down).unwrap();
        assert_eq!(result, u128::MAX);
    }

    #[test]
    fn mul_div_result_overflow() {
        let result = mul_div(u128::MAX, 2, 1, Rounding::Down);
        assert!(matches!(result, Err(FixedPointError::Overflow)));
    }

    #[test]
    fn mul_div_rounding_down_behavior() {
        // 7 * 10 / 8 = 8.75, floor is 8
        assert_eq!(mul_div(7, 10, 8, Rounding::Down).unwrap(), 8);
    }

    #[test]
    fn mul_div_rounding_up_non_exact() {
        // 7 * 10 / 3 = 23.33..., ceil is 24
        assert_eq!(mul_div(7, 10, 3, Rounding::Up).unwrap(), 24);
    }

    #[test]
    fn mul_div_rounding_up_exact_division() {
        assert_eq!(mul_div(20, 10, 5, Rounding::Up).unwrap(), 40);
    }

    #[test]
    fn sqrt_exact_squares() {
        assert_eq!(sqrt(U256::ZERO), 0);
        assert_eq!(sqrt(U256::from(1u8)), 1);
        assert_eq!(sqrt(U256::from(144u8)), 12);
        assert_eq!(sqrt(U256::from(1u128 << 64)), 1u128 << 32);
    }

    #[test]
    fn sqrt_floors_non_squares() {
        assert_eq!(sqrt(U256::from(2u8)), 1);
        assert_eq!(sqrt(U256::from(143u8)), 11);
    }

    #[test]
    fn sqrt_large_values() {
        // sqrt(2^254) = 2^127
        let n = U256::from(1u8) << 254;
        assert_eq!(sqrt(n), 1u128 << 127);
    }
}
