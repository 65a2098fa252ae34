//! Signed Q64.64 fixed-point value
//!
//! Values are stored as a scaled `i128`: 64 integer bits and 64
//! fractional bits. All arithmetic that can overflow goes through
//! checked operations with 256-bit intermediates; the panicking `Add`,
//! `Sub` and `Neg` operator impls exist only for sites where overflow
//! is impossible (constants, values already bounds-checked).

use crate::error::FixedPointError;
use crate::wide;
use alloy_primitives::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// Rounding direction for operations that lose precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Round the magnitude toward zero
    Down,
    /// Round the magnitude away from zero
    Up,
}

/// Signed fixed-point number with 64 integer and 64 fractional bits.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Q64(i128);

impl Q64 {
    /// Number of fractional bits
    pub const FRACTIONAL_BITS: u32 = 64;

    /// Zero
    pub const ZERO: Self = Self(0);

    /// One (2^64)
    pub const ONE: Self = Self(1i128 << 64);

    /// Two
    pub const TWO: Self = Self(2i128 << 64);

    /// One half
    pub const HALF: Self = Self(1i128 << 63);

    /// Largest representable value
    pub const MAX: Self = Self(i128::MAX);

    /// Smallest representable value
    pub const MIN: Self = Self(i128::MIN);

    /// Create from a raw scaled integer.
    pub const fn from_raw(raw: i128) -> Self {
        Self(raw)
    }

    /// Get the raw scaled integer value.
    pub const fn raw(self) -> i128 {
        self.0
    }

    /// Create from a signed integer.
    pub const fn from_int(value: i64) -> Self {
        Self((value as i128) << 64)
    }

    /// Create from a decimal string with exact parsing.
    ///
    /// This is the primary way to build calibration values (strikes,
    /// volatilities, token amounts) from configuration or test input.
    /// The magnitude is limited to what `Decimal` can scale by 2^64,
    /// roughly 4.2e9, which comfortably covers calibration inputs.
    pub fn from_decimal_str(s: &str) -> Result<Self, FixedPointError> {
        use std::str::FromStr;

        let decimal = Decimal::from_str(s).map_err(|_| FixedPointError::InvalidDecimal {
            input: s.to_string(),
        })?;

        let scale = Decimal::from_i128_with_scale(1i128 << 64, 0);
        let scaled = decimal
            .checked_mul(scale)
            .ok_or(FixedPointError::Overflow)?;

        scaled.round().to_i128().map(Self).ok_or(FixedPointError::Overflow)
    }

    /// Convert to `f64` for display or diagnostics.
    ///
    /// Never use the result for curve math; it exists for logging and
    /// human-readable assertions only.
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / (1u128 << 64) as f64
    }

    /// Absolute value.
    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn min(self, other: Self) -> Self {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    pub fn max(self, other: Self) -> Self {
        if self.0 >= other.0 {
            self
        } else {
            other
        }
    }

    /// Checked addition.
    pub fn checked_add(self, rhs: Self) -> Result<Self, FixedPointError> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or(FixedPointError::Overflow)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, rhs: Self) -> Result<Self, FixedPointError> {
        self.0
            .checked_sub(rhs.0)
            .map(Self)
            .ok_or(FixedPointError::Overflow)
    }

    /// Addition clamped to the representable range.
    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    /// Subtraction clamped to the representable range.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Checked multiplication with a full-precision 256-bit intermediate.
    ///
    /// The result is truncated toward zero.
    pub fn checked_mul(self, rhs: Self) -> Result<Self, FixedPointError> {
        let negative = (self.0 < 0) != (rhs.0 < 0);
        let prod = U256::from(self.0.unsigned_abs()) * U256::from(rhs.0.unsigned_abs());
        let magnitude =
            u128::try_from(prod >> 64).map_err(|_| FixedPointError::Overflow)?;
        Self::from_magnitude(magnitude, negative)
    }

    /// Checked division with a full-precision 256-bit intermediate.
    ///
    /// The result is truncated toward zero.
    pub fn checked_div(self, rhs: Self) -> Result<Self, FixedPointError> {
        if rhs.0 == 0 {
            return Err(FixedPointError::DivisionByZero);
        }
        let negative = (self.0 < 0) != (rhs.0 < 0);
        let num = U256::from(self.0.unsigned_abs()) << 64;
        let quotient = num / U256::from(rhs.0.unsigned_abs());
        let magnitude = u128::try_from(quotient).map_err(|_| FixedPointError::Overflow)?;
        Self::from_magnitude(magnitude, negative)
    }

    /// Full-precision `self * numerator / denominator` with an explicit
    /// rounding direction on the magnitude.
    ///
    /// The scale factors cancel, so this is exact proportional math:
    /// it is the primitive behind `delLiquidity * reserve / liquidity`
    /// in allocation and removal.
    pub fn mul_div(
        self,
        numerator: Self,
        denominator: Self,
        rounding: Rounding,
    ) -> Result<Self, FixedPointError> {
        let negative =
            ((self.0 < 0) != (numerator.0 < 0)) != (denominator.0 < 0);
        let magnitude = wide::mul_div(
            self.0.unsigned_abs(),
            numerator.0.unsigned_abs(),
            denominator.0.unsigned_abs(),
            rounding,
        )?;
        Self::from_magnitude(magnitude, negative)
    }

    /// Fixed-point square root.
    ///
    /// Fails with `SqrtOfNegative` for negative inputs.
    pub fn sqrt(self) -> Result<Self, FixedPointError> {
        if self.0 < 0 {
            return Err(FixedPointError::SqrtOfNegative);
        }
        if self.0 == 0 {
            return Ok(Self::ZERO);
        }
        // sqrt(raw * 2^64) keeps the Q64.64 scale: the root of the
        // shifted value is at most 2^95.5, well inside i128.
        let shifted = U256::from(self.0 as u128) << 64;
        Ok(Self(wide::sqrt(shifted) as i128))
    }

    fn from_magnitude(magnitude: u128, negative: bool) -> Result<Self, FixedPointError> {
        if magnitude > i128::MAX as u128 {
            return Err(FixedPointError::Overflow);
        }
        let value = magnitude as i128;
        Ok(Self(if negative { -value } else { value }))
    }
}

impl fmt::Display for Q64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.8}", self.to_f64())
    }
}

/// Panicking arithmetic via traits, for operations that cannot overflow
/// (bounds already established by the caller).
impl Add for Q64 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Q64 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Q64 {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Q64, expected: f64, tolerance: f64) {
        let got = a.to_f64();
        assert!(
            (got - expected).abs() < tolerance,
            "expected {expected}, got {got}"
        );
    }

    #[test]
    fn constants_scale_correctly() {
        assert_eq!(Q64::ONE.raw(), 1i128 << 64);
        assert_eq!(Q64::HALF.to_f64(), 0.5);
        assert_eq!(Q64::TWO.to_f64(), 2.0);
        assert_eq!(Q64::from_int(-3).to_f64(), -3.0);
    }

    #[test]
    fn decimal_string_parsing() {
        let v = Q64::from_decimal_str("0.5").unwrap();
        assert_eq!(v, Q64::HALF);

        let v = Q64::from_decimal_str("1000").unwrap();
        assert_eq!(v, Q64::from_int(1000));

        let v = Q64::from_decimal_str("0.85").unwrap();
        approx(v, 0.85, 1e-15);

        assert!(matches!(
            Q64::from_decimal_str("not_a_number"),
            Err(FixedPointError::InvalidDecimal { .. })
        ));
    }

    #[test]
    fn checked_add_and_sub() {
        let a = Q64::from_int(3);
        let b = Q64::from_int(2);
        assert_eq!(a.checked_add(b).unwrap(), Q64::from_int(5));
        assert_eq!(a.checked_sub(b).unwrap(), Q64::from_int(1));
        assert_eq!(b.checked_sub(a).unwrap(), Q64::from_int(-1));

        assert!(matches!(
            Q64::MAX.checked_add(Q64::ONE),
            Err(FixedPointError::Overflow)
        ));
    }

    #[test]
    fn checked_mul_exact_cases() {
        let three_halves = Q64::ONE.checked_add(Q64::HALF).unwrap();
        assert_eq!(
            three_halves.checked_mul(Q64::TWO).unwrap(),
            Q64::from_int(3)
        );
        assert_eq!(
            Q64::from_int(-4).checked_mul(Q64::HALF).unwrap(),
            Q64::from_int(-2)
        );
        assert_eq!(Q64::ZERO.checked_mul(Q64::MAX).unwrap(), Q64::ZERO);
    }

    #[test]
    fn checked_mul_overflow() {
        let big = Q64::from_int(i64::MAX);
        assert!(matches!(
            big.checked_mul(big),
            Err(FixedPointError::Overflow)
        ));
    }

    #[test]
    fn checked_div_cases() {
        assert_eq!(
            Q64::from_int(3).checked_div(Q64::TWO).unwrap().to_f64(),
            1.5
        );
        assert_eq!(
            Q64::from_int(-1).checked_div(Q64::TWO).unwrap(),
            -Q64::HALF
        );
        assert!(matches!(
            Q64::ONE.checked_div(Q64::ZERO),
            Err(FixedPointError::DivisionByZero)
        ));
    }

    #[test]
    fn mul_div_rounding_bias() {
        // 1 * 1 / 3: down truncates, up adds one raw unit
        let down = Q64::ONE
            .mul_div(Q64::ONE, Q64::from_int(3), Rounding::Down)
            .unwrap();
        let up = Q64::ONE
            .mul_div(Q64::ONE, Q64::from_int(3), Rounding::Up)
            .unwrap();
        assert_eq!(up.raw() - down.raw(), 1);

        // exact proportion has no rounding gap
        let down = Q64::from_int(10)
            .mul_div(Q64::from_int(3), Q64::from_int(5), Rounding::Down)
            .unwrap();
        let up = Q64::from_int(10)
            .mul_div(Q64::from_int(3), Q64::from_int(5), Rounding::Up)
            .unwrap();
        assert_eq!(down, Q64::from_int(6));
        assert_eq!(up, down);
    }

    #[test]
    fn sqrt_known_values() {
        assert_eq!(Q64::from_int(4).sqrt().unwrap(), Q64::TWO);
        assert_eq!(Q64::ZERO.sqrt().unwrap(), Q64::ZERO);
        approx(Q64::TWO.sqrt().unwrap(), std::f64::consts::SQRT_2, 1e-12);
        approx(Q64::HALF.sqrt().unwrap(), 0.7071067811865476, 1e-12);
        assert!(matches!(
            Q64::from_int(-1).sqrt(),
            Err(FixedPointError::SqrtOfNegative)
        ));
    }

    #[test]
    fn display_formatting() {
        let v = Q64::from_decimal_str("123.456").unwrap();
        assert!(format!("{v}").starts_with("123.456"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn add_sub_roundtrip(a in -(1i128 << 90)..(1i128 << 90), b in -(1i128 << 90)..(1i128 << 90)) {
                let a = Q64::from_raw(a);
                let b = Q64::from_raw(b);
                let sum = a.checked_add(b).unwrap();
                prop_assert_eq!(sum.checked_sub(b).unwrap(), a);
            }

            #[test]
            fn mul_div_rounding_gap_is_at_most_one_raw_unit(
                a in 0i128..(1i128 << 80),
                b in 0i128..(1i128 << 80),
                // denominator large enough that the quotient stays
                // representable for any (a, b) above
                d in (1i128 << 40)..(1i128 << 80),
            ) {
                let a = Q64::from_raw(a);
                let b = Q64::from_raw(b);
                let d = Q64::from_raw(d);
                let down = a.mul_div(b, d, Rounding::Down).unwrap();
                let up = a.mul_div(b, d, Rounding::Up).unwrap();
                prop_assert!(up.raw() - down.raw() <= 1);
                prop_assert!(up >= down);
            }

            #[test]
            fn sqrt_squares_back_within_truncation(raw in 0i128..(1i128 << 100)) {
                let x = Q64::from_raw(raw);
                let root = x.sqrt().unwrap();
                let squared = root.checked_mul(root).unwrap();
                prop_assert!(squared <= x);
                // one raw unit of slack for the truncation in the square
                let next = root.checked_add(Q64::from_raw(1)).unwrap();
                prop_assert!(next.checked_mul(next).unwrap().raw() >= x.raw() - 1);
            }
        }
    }
}
