//! Elementary functions on Q64.64 values
//!
//! Natural exponential and logarithm evaluated entirely on scaled
//! integers, so results are bit-identical on every platform. Both use
//! power-of-two range reduction followed by a short series: the
//! reduced arguments are small enough that two dozen terms reach the
//! resolution of the 64 fractional bits.

use crate::error::FixedPointError;
use crate::q64::Q64;

/// ln(2) in Q64.64
pub const LN2: Q64 = Q64::from_raw(12_786_308_645_202_655_660); // 0.6931471805599453

/// Largest input exp() accepts before the result leaves the Q64.64 range.
/// exp(43.7) > 2^63 already, so inputs are capped at 43.
const EXP_INPUT_MAX_RAW: i128 = 43i128 << 64;

/// Below this input exp() is smaller than the smallest representable
/// positive value (2^-64), so the result flushes to zero.
const EXP_INPUT_MIN_RAW: i128 = -(45i128 << 64);

impl Q64 {
    /// Natural exponential.
    ///
    /// Range-reduces around ln(2): `exp(x) = 2^k * exp(r)` with
    /// `|r| <= ln(2)/2`, then sums the Taylor series for `exp(r)`.
    /// Inputs above ~43 overflow; inputs below -45 return zero.
    pub fn exp(self) -> Result<Self, FixedPointError> {
        if self.raw() > EXP_INPUT_MAX_RAW {
            return Err(FixedPointError::Overflow);
        }
        if self.raw() < EXP_INPUT_MIN_RAW {
            return Ok(Self::ZERO);
        }

        // k = round(x / ln2); arithmetic shift floors, so add 1/2 first
        let quotient = self.checked_div(LN2)?;
        let k = ((quotient.raw() + Self::HALF.raw()) >> 64) as i32;
        let r = self.checked_sub(LN2.checked_mul(Self::from_int(k as i64))?)?;

        // exp(r) = 1 + r + r^2/2! + ... ; |r| <= 0.347 converges fast
        let mut term = Self::ONE;
        let mut sum = Self::ONE;
        for i in 1..=24i128 {
            term = term.checked_mul(r)?;
            term = Self::from_raw(term.raw() / i);
            if term.raw() == 0 {
                break;
            }
            sum = sum.checked_add(term)?;
        }

        // scale by 2^k
        if k >= 0 {
            if k >= 63 {
                return Err(FixedPointError::Overflow);
            }
            sum.raw()
                .checked_mul(1i128 << k)
                .map(Self::from_raw)
                .ok_or(FixedPointError::Overflow)
        } else {
            let shift = (-k) as u32;
            if shift >= 127 {
                return Ok(Self::ZERO);
            }
            Ok(Self::from_raw(sum.raw() >> shift))
        }
    }

    /// Natural logarithm.
    ///
    /// Normalizes to `m * 2^k` with `m` in `[1, 2)`, then evaluates
    /// `ln(m) = 2 * atanh((m-1)/(m+1))` as a series; the argument is at
    /// most 1/3, so 20 odd terms exceed the available precision.
    /// Fails with `LogNonPositive` for `x <= 0`.
    pub fn ln(self) -> Result<Self, FixedPointError> {
        if self.raw() <= 0 {
            return Err(FixedPointError::LogNonPositive);
        }

        let raw = self.raw() as u128;
        let msb = 127 - raw.leading_zeros() as i32;
        let k = msb - 64;
        let mantissa = if k >= 0 {
            Self::from_raw((raw >> k) as i128)
        } else {
            Self::from_raw((raw << (-k)) as i128)
        };

        let y = mantissa
            .checked_sub(Self::ONE)?
            .checked_div(mantissa.checked_add(Self::ONE)?)?;
        let y_squared = y.checked_mul(y)?;

        let mut term = y;
        let mut sum = y;
        let mut i = 3i128;
        while i <= 41 {
            term = term.checked_mul(y_squared)?;
            let contribution = Self::from_raw(term.raw() / i);
            if contribution.raw() == 0 {
                break;
            }
            sum = sum.checked_add(contribution)?;
            i += 2;
        }
        let ln_mantissa = Self::from_raw(sum.raw() << 1);

        LN2.checked_mul(Self::from_int(k as i64))?
            .checked_add(ln_mantissa)
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
    fn exp_known_values() {
        assert_eq!(Q64::ZERO.exp().unwrap(), Q64::ONE);
        approx(Q64::ONE.exp().unwrap(), std::f64::consts::E, 1e-12);
        approx(Q64::HALF.exp().unwrap(), 1.6487212707001282, 1e-12);
        approx(Q64::from_int(-1).exp().unwrap(), 0.36787944117144233, 1e-12);
        approx(Q64::from_int(10).exp().unwrap(), 22026.465794806718, 1e-7);
        approx(Q64::from_int(-10).exp().unwrap(), 4.5399929762484854e-5, 1e-14);
    }

    #[test]
    fn exp_range_behavior() {
        assert!(matches!(
            Q64::from_int(44).exp(),
            Err(FixedPointError::Overflow)
        ));
        assert_eq!(Q64::from_int(-50).exp().unwrap(), Q64::ZERO);
    }

    #[test]
    fn ln_known_values() {
        assert_eq!(Q64::ONE.ln().unwrap(), Q64::ZERO);
        approx(Q64::TWO.ln().unwrap(), std::f64::consts::LN_2, 1e-12);
        approx(Q64::HALF.ln().unwrap(), -std::f64::consts::LN_2, 1e-12);
        approx(Q64::from_int(10).ln().unwrap(), 2.302585092994046, 1e-12);
        approx(
            Q64::from_decimal_str("0.0001").unwrap().ln().unwrap(),
            -9.210340371976182,
            1e-11,
        );
    }

    #[test]
    fn ln_domain() {
        assert!(matches!(
            Q64::ZERO.ln(),
            Err(FixedPointError::LogNonPositive)
        ));
        assert!(matches!(
            Q64::from_int(-1).ln(),
            Err(FixedPointError::LogNonPositive)
        ));
    }

    #[test]
    fn exp_ln_roundtrip() {
        for s in ["0.25", "1", "2.5", "7.125", "100"] {
            let x = Q64::from_decimal_str(s).unwrap();
            let roundtrip = x.ln().unwrap().exp().unwrap();
            let err = (roundtrip.to_f64() - x.to_f64()).abs() / x.to_f64();
            assert!(err < 1e-12, "roundtrip of {s} drifted by {err}");
        }
    }
}
