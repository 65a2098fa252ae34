//! Error types for the replication math layer

use rmm_fixed::FixedPointError;
use thiserror::Error;

/// Errors from the normal-distribution approximations and the trading
/// function.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MathError {
    /// An approximation was evaluated outside its valid domain
    #[error("domain error: {context}")]
    OutOfDomain { context: &'static str },

    /// Underlying fixed-point arithmetic failure
    #[error(transparent)]
    Fixed(#[from] FixedPointError),
}
