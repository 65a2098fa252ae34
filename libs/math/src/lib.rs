//! Replication math for the covered-call market maker
//!
//! Two layers live here: deterministic approximations of the standard
//! normal CDF and its inverse, and the trading function that maps a
//! risky reserve to the stable reserve a no-arbitrage covered-call
//! curve implies. Everything runs on [`rmm_fixed::Q64`] so results are
//! identical for every caller.

pub mod cdf;
pub mod error;
pub mod replication;

pub use cdf::{norm_cdf, norm_ppf};
pub use error::MathError;
pub use replication::{
    invariant, risky_given_stable, stable_given_risky, years_between, SECONDS_PER_YEAR,
};
