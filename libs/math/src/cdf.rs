//! Standard normal CDF and its inverse on Q64.64 values
//!
//! The forward direction uses the Abramowitz & Stegun 7.1.26 rational
//! approximation of erf (absolute error below 1.5e-7); the inverse uses
//! Acklam's rational probit (absolute error below 1.2e-8 before
//! fixed-point rounding). Both are deliberately polynomial so every
//! evaluation is a fixed, deterministic sequence of Q64.64 operations.
//!
//! All coefficients are raw Q64.64 constants; the decimal value is
//! noted beside each one.

use crate::error::MathError;
use rmm_fixed::Q64;

/// sqrt(2)
const SQRT_2: Q64 = Q64::from_raw(26_087_635_650_665_564_425); // 1.4142135623730951

// Abramowitz & Stegun 7.1.26 erf coefficients
const ERF_A1: Q64 = Q64::from_raw(4_700_776_266_031_822_965); // 0.254829592
const ERF_A2: Q64 = Q64::from_raw(-5_248_038_478_797_710_847); // -0.284496736
const ERF_A3: Q64 = Q64::from_raw(26_220_455_503_081_073_510); // 1.421413741
const ERF_A4: Q64 = Q64::from_raw(-26_805_923_542_261_272_340); // -1.453152027
const ERF_A5: Q64 = Q64::from_raw(19_579_474_307_208_894_254); // 1.061405429
const ERF_P: Q64 = Q64::from_raw(6_042_989_182_524_993_094); // 0.3275911

// Acklam inverse-CDF coefficients, central region numerator/denominator
const ICDF_A1: Q64 = Q64::from_raw(-732_277_268_835_384_088_363); // -39.69683028665376
const ICDF_A2: Q64 = Q64::from_raw(4_075_736_131_721_770_832_428); // 220.9460984245205
const ICDF_A3: Q64 = Q64::from_raw(-5_089_982_614_855_123_968_030); // -275.9285104469687
const ICDF_A4: Q64 = Q64::from_raw(2_552_250_039_309_321_074_870); // 138.357751867269
const ICDF_A5: Q64 = Q64::from_raw(-565_665_681_998_200_242_698); // -30.66479806614716
const ICDF_A6: Q64 = Q64::from_raw(46_239_130_322_213_998_667); // 2.506628277459239
const ICDF_B1: Q64 = Q64::from_raw(-1_004_906_652_664_955_705_667); // -54.47609879822406
const ICDF_B2: Q64 = Q64::from_raw(2_980_732_578_456_464_406_132); // 161.5858368580409
const ICDF_B3: Q64 = Q64::from_raw(-2_872_139_234_012_985_971_771); // -155.6989798598866
const ICDF_B4: Q64 = Q64::from_raw(1_232_266_704_180_817_165_196); // 66.80131188771972
const ICDF_B5: Q64 = Q64::from_raw(-244_985_333_730_518_420_514); // -13.28068155288572

// Acklam tail region numerator/denominator
const ICDF_C1: Q64 = Q64::from_raw(-143_605_947_303_788_039); // -0.007784894002430293
const ICDF_C2: Q64 = Q64::from_raw(-5_947_164_951_755_284_849); // -0.3223964580411365
const ICDF_C3: Q64 = Q64::from_raw(-44_286_173_521_644_288_303); // -2.400758277161838
const ICDF_C4: Q64 = Q64::from_raw(-47_034_263_609_683_431_318); // -2.549732539343734
const ICDF_C5: Q64 = Q64::from_raw(80_698_309_826_038_582_002); // 4.374664141464968
const ICDF_C6: Q64 = Q64::from_raw(54_199_559_035_435_628_852); // 2.938163982698783
const ICDF_D1: Q64 = Q64::from_raw(143_602_289_436_392_765); // 0.007784695709041462
const ICDF_D2: Q64 = Q64::from_raw(5_948_468_602_138_889_755); // 0.3224671290700398
const ICDF_D3: Q64 = Q64::from_raw(45_104_763_653_767_479_495); // 2.445134137142996
const ICDF_D4: Q64 = Q64::from_raw(69_256_615_734_324_433_706); // 3.754408661907416

/// Boundary between Acklam's tail and central regions (0.02425)
const ICDF_P_LOW: Q64 = Q64::from_raw(447_333_543_787_456_627);

/// Beyond |x| = 8 the CDF is 0 or 1 at this approximation's resolution.
const CDF_CLAMP: Q64 = Q64::from_int(8);

/// Error function via the Abramowitz & Stegun rational approximation.
fn erf(x: Q64) -> Result<Q64, MathError> {
    let negative = x.is_negative();
    let x = x.abs();

    let t = Q64::ONE.checked_div(Q64::ONE.checked_add(ERF_P.checked_mul(x)?)?)?;
    let poly = ERF_A5
        .checked_mul(t)?
        .checked_add(ERF_A4)?
        .checked_mul(t)?
        .checked_add(ERF_A3)?
        .checked_mul(t)?
        .checked_add(ERF_A2)?
        .checked_mul(t)?
        .checked_add(ERF_A1)?
        .checked_mul(t)?;

    let gaussian = (-x.checked_mul(x)?).exp()?;
    let y = Q64::ONE.checked_sub(poly.checked_mul(gaussian)?)?;

    Ok(if negative { -y } else { y })
}

/// Cumulative standard normal distribution, `Phi(x)` in `[0, 1]`.
pub fn norm_cdf(x: Q64) -> Result<Q64, MathError> {
    if x >= CDF_CLAMP {
        return Ok(Q64::ONE);
    }
    if x <= -CDF_CLAMP {
        return Ok(Q64::ZERO);
    }

    let e = erf(x.checked_div(SQRT_2)?)?;
    // (1 + erf) / 2; erf is within [-1, 1] so the sum cannot overflow
    let p = Q64::from_raw((Q64::ONE.raw() + e.raw()) >> 1);

    // the polynomial can stray a few ulps outside [0, 1]; pin it
    Ok(p.max(Q64::ZERO).min(Q64::ONE))
}

/// Inverse cumulative standard normal distribution (probit).
///
/// Defined for `p` strictly inside `(0, 1)`; fails with a domain error
/// otherwise.
pub fn norm_ppf(p: Q64) -> Result<Q64, MathError> {
    if p <= Q64::ZERO || p >= Q64::ONE {
        return Err(MathError::OutOfDomain {
            context: "inverse CDF is defined on (0, 1)",
        });
    }

    let p_high = Q64::ONE.checked_sub(ICDF_P_LOW)?;
    if p < ICDF_P_LOW {
        let x = tail_estimate(p)?;
        return Ok(x);
    }
    if p > p_high {
        let x = tail_estimate(Q64::ONE.checked_sub(p)?)?;
        return Ok(-x);
    }

    // central region: rational polynomial in q = p - 1/2
    let q = p.checked_sub(Q64::HALF)?;
    let r = q.checked_mul(q)?;

    let numerator = ICDF_A1
        .checked_mul(r)?
        .checked_add(ICDF_A2)?
        .checked_mul(r)?
        .checked_add(ICDF_A3)?
        .checked_mul(r)?
        .checked_add(ICDF_A4)?
        .checked_mul(r)?
        .checked_add(ICDF_A5)?
        .checked_mul(r)?
        .checked_add(ICDF_A6)?
        .checked_mul(q)?;
    let denominator = ICDF_B1
        .checked_mul(r)?
        .checked_add(ICDF_B2)?
        .checked_mul(r)?
        .checked_add(ICDF_B3)?
        .checked_mul(r)?
        .checked_add(ICDF_B4)?
        .checked_mul(r)?
        .checked_add(ICDF_B5)?
        .checked_mul(r)?
        .checked_add(Q64::ONE)?;

    Ok(numerator.checked_div(denominator)?)
}

/// Lower-tail estimate for `p < 0.02425`; the upper tail is handled by
/// symmetry at the call site.
fn tail_estimate(p: Q64) -> Result<Q64, MathError> {
    // q = sqrt(-2 ln p)
    let q = (-Q64::TWO.checked_mul(p.ln()?)?).sqrt()?;

    let numerator = ICDF_C1
        .checked_mul(q)?
        .checked_add(ICDF_C2)?
        .checked_mul(q)?
        .checked_add(ICDF_C3)?
        .checked_mul(q)?
        .checked_add(ICDF_C4)?
        .checked_mul(q)?
        .checked_add(ICDF_C5)?
        .checked_mul(q)?
        .checked_add(ICDF_C6)?;
    let denominator = ICDF_D1
        .checked_mul(q)?
        .checked_add(ICDF_D2)?
        .checked_mul(q)?
        .checked_add(ICDF_D3)?
        .checked_mul(q)?
        .checked_add(ICDF_D4)?
        .checked_mul(q)?
        .checked_add(Q64::ONE)?;

    Ok(numerator.checked_div(denominator)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Q64 {
        Q64::from_decimal_str(s).unwrap()
    }

    fn approx(a: Q64, expected: f64, tolerance: f64) {
        let got = a.to_f64();
        assert!(
            (got - expected).abs() < tolerance,
            "expected {expected}, got {got}"
        );
    }

    #[test]
    fn cdf_known_values() {
        approx(norm_cdf(Q64::ZERO).unwrap(), 0.5, 2e-7);
        approx(norm_cdf(Q64::ONE).unwrap(), 0.8413447460685429, 2e-7);
        approx(norm_cdf(Q64::from_int(-1)).unwrap(), 0.15865525393145705, 2e-7);
        approx(norm_cdf(Q64::HALF).unwrap(), 0.6914624612740131, 2e-7);
        approx(norm_cdf(Q64::TWO).unwrap(), 0.9772498680518208, 2e-7);
    }

    #[test]
    fn cdf_symmetry() {
        for s in ["0.1", "0.7", "1.3", "2.2", "3.5"] {
            let x = q(s);
            let upper = norm_cdf(x).unwrap();
            let lower = norm_cdf(-x).unwrap();
            let sum = upper.checked_add(lower).unwrap();
            approx(sum, 1.0, 1e-6);
        }
    }

    #[test]
    fn cdf_clamps_at_extremes() {
        assert_eq!(norm_cdf(Q64::from_int(9)).unwrap(), Q64::ONE);
        assert_eq!(norm_cdf(Q64::from_int(-9)).unwrap(), Q64::ZERO);
    }

    #[test]
    fn ppf_known_values() {
        assert_eq!(norm_ppf(Q64::HALF).unwrap(), Q64::ZERO);
        approx(norm_ppf(q("0.8413447460685429")).unwrap(), 1.0, 1e-6);
        approx(norm_ppf(q("0.01")).unwrap(), -2.3263478740408408, 1e-6);
        approx(norm_ppf(q("0.99")).unwrap(), 2.3263478740408408, 1e-6);
        approx(norm_ppf(q("0.3")).unwrap(), -0.5244005127080407, 1e-6);
        // tail regions
        approx(norm_ppf(q("0.0001")).unwrap(), -3.719016485455709, 1e-6);
        approx(norm_ppf(q("0.9999")).unwrap(), 3.719016485455709, 1e-6);
    }

    #[test]
    fn ppf_domain_errors() {
        assert!(matches!(
            norm_ppf(Q64::ZERO),
            Err(MathError::OutOfDomain { .. })
        ));
        assert!(matches!(
            norm_ppf(Q64::ONE),
            Err(MathError::OutOfDomain { .. })
        ));
        assert!(matches!(
            norm_ppf(Q64::from_int(2)),
            Err(MathError::OutOfDomain { .. })
        ));
        assert!(matches!(
            norm_ppf(Q64::from_int(-1)),
            Err(MathError::OutOfDomain { .. })
        ));
    }

    #[test]
    fn ppf_cdf_roundtrip() {
        // composed error is bounded by the CDF approximation error
        for s in ["0.05", "0.2", "0.5", "0.75", "0.97"] {
            let p = q(s);
            let roundtrip = norm_cdf(norm_ppf(p).unwrap()).unwrap();
            approx(roundtrip, p.to_f64(), 1e-6);
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn cdf_stays_in_the_unit_interval(raw in -(20i128 << 64)..(20i128 << 64)) {
                let p = norm_cdf(Q64::from_raw(raw)).unwrap();
                prop_assert!(p >= Q64::ZERO);
                prop_assert!(p <= Q64::ONE);
            }

            // Monotone over steps large enough that the true density
            // dominates the approximation's error drift. Not asserted
            // in the far tails where the density drops below that
            // drift.
            #[test]
            fn cdf_is_monotone_in_the_central_region(
                a in -(3i128 << 64)..(3i128 << 64),
                step in (1i128 << 50)..(1i128 << 60),
            ) {
                let lo = Q64::from_raw(a);
                let hi = Q64::from_raw(a + step);
                let p_lo = norm_cdf(lo).unwrap();
                let p_hi = norm_cdf(hi).unwrap();
                prop_assert!(p_hi > p_lo);
            }

            #[test]
            fn ppf_inverts_cdf(raw in (1i128 << 58)..(((1i128) << 64) - (1i128 << 58))) {
                let p = Q64::from_raw(raw);
                let x = norm_ppf(p).unwrap();
                let roundtrip = norm_cdf(x).unwrap();
                let diff = roundtrip.checked_sub(p).unwrap().abs();
                prop_assert!(diff < Q64::from_raw(1i128 << 46)); // ~1.9e-6
            }
        }
    }
}
