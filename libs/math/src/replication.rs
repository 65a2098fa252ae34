//! Covered-call trading function and pool invariant
//!
//! The curve is the Black-Scholes replicating portfolio of a European
//! covered call: with `x` the risky reserve per liquidity share, the
//! implied stable reserve per share is
//! `K * Phi(Phi^-1(1 - x) - sigma * sqrt(tau))`. All quantities scale
//! linearly with the pool's liquidity, which is what makes allocation
//! and removal purely proportional.

use crate::cdf::{norm_cdf, norm_ppf};
use crate::error::MathError;
use rmm_fixed::Q64;

/// Seconds per year used to express tau; Gregorian average.
pub const SECONDS_PER_YEAR: u64 = 31_556_952;

/// Time between two timestamps expressed in years, clamped at zero
/// when `end <= start`.
pub fn years_between(start: u64, end: u64) -> Q64 {
    let seconds = end.saturating_sub(start);
    Q64::from_raw(((seconds as i128) << 64) / SECONDS_PER_YEAR as i128)
}

/// Stable reserve the curve implies for a given risky reserve.
///
/// `reserve_risky / liquidity` must lie in `[0, 1]`. At `tau = 0` the
/// curve degenerates to the exercise payoff `strike * (1 - x)` per
/// share.
pub fn stable_given_risky(
    reserve_risky: Q64,
    liquidity: Q64,
    strike: Q64,
    sigma: Q64,
    tau: Q64,
) -> Result<Q64, MathError> {
    let per_share = risky_fraction(reserve_risky, liquidity)?;
    let implied = stable_per_share(per_share, strike, sigma, tau)?;
    Ok(liquidity.checked_mul(implied)?)
}

/// Risky reserve the curve implies for a given stable reserve; the
/// inverse relation of [`stable_given_risky`].
///
/// `reserve_stable / liquidity` must lie in `[0, strike]`.
pub fn risky_given_stable(
    reserve_stable: Q64,
    liquidity: Q64,
    strike: Q64,
    sigma: Q64,
    tau: Q64,
) -> Result<Q64, MathError> {
    if liquidity <= Q64::ZERO {
        return Err(MathError::OutOfDomain {
            context: "liquidity must be positive",
        });
    }
    let per_share = reserve_stable.checked_div(liquidity)?;
    if per_share < Q64::ZERO || per_share > strike {
        return Err(MathError::OutOfDomain {
            context: "stable reserve per share must lie in [0, strike]",
        });
    }

    let risky = if per_share.is_zero() {
        Q64::ONE
    } else if per_share == strike {
        Q64::ZERO
    } else if tau.is_zero() {
        // linear payoff once expired: x = 1 - y / strike
        Q64::ONE.checked_sub(per_share.checked_div(strike)?)?
    } else {
        let moneyness = per_share.checked_div(strike)?;
        let vol = sigma.checked_mul(tau.sqrt()?)?;
        let d = norm_ppf(moneyness)?.checked_add(vol)?;
        Q64::ONE.checked_sub(norm_cdf(d)?)?
    };

    Ok(liquidity.checked_mul(risky)?)
}

/// Pool invariant: actual stable reserve minus the curve-implied one.
///
/// Non-decreasing across valid swaps; its growth is the fee capture.
pub fn invariant(
    reserve_risky: Q64,
    reserve_stable: Q64,
    liquidity: Q64,
    strike: Q64,
    sigma: Q64,
    tau: Q64,
) -> Result<Q64, MathError> {
    let implied = stable_given_risky(reserve_risky, liquidity, strike, sigma, tau)?;
    Ok(reserve_stable.checked_sub(implied)?)
}

fn risky_fraction(reserve_risky: Q64, liquidity: Q64) -> Result<Q64, MathError> {
    if liquidity <= Q64::ZERO {
        return Err(MathError::OutOfDomain {
            context: "liquidity must be positive",
        });
    }
    let fraction = reserve_risky.checked_div(liquidity)?;
    if fraction < Q64::ZERO || fraction > Q64::ONE {
        return Err(MathError::OutOfDomain {
            context: "risky reserve per share must lie in [0, 1]",
        });
    }
    Ok(fraction)
}

fn stable_per_share(fraction: Q64, strike: Q64, sigma: Q64, tau: Q64) -> Result<Q64, MathError> {
    if fraction.is_zero() {
        // empty risky side: the pool holds full exercise value
        return Ok(strike);
    }
    if fraction == Q64::ONE {
        return Ok(Q64::ZERO);
    }
    if tau.is_zero() {
        return Ok(strike.checked_mul(Q64::ONE.checked_sub(fraction)?)?);
    }

    let vol = sigma.checked_mul(tau.sqrt()?)?;
    let d = norm_ppf(Q64::ONE.checked_sub(fraction)?)?.checked_sub(vol)?;
    Ok(strike.checked_mul(norm_cdf(d)?)?)
}
