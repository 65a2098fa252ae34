//! Engine error taxonomy.
//!
//! Every rejected transition maps to exactly one variant here, so callers
//! can match on the failure class without parsing messages.

use rmm_fixed::FixedPointError;
use rmm_math::MathError;
use thiserror::Error;

use crate::ledger::LedgerError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Strike, sigma, or maturity failed validation at pool creation.
    #[error("invalid calibration: {context}")]
    InvalidCalibration { context: &'static str },

    /// A pool with the same (strike, sigma, maturity) triple already exists.
    #[error("pool already exists")]
    PoolAlreadyExists,

    /// The pool id does not resolve to a created pool.
    #[error("pool not found")]
    PoolNotFound,

    /// Trading or allocation attempted at or past maturity.
    #[error("pool has expired")]
    PoolExpired,

    /// Bootstrap liquidity at creation did not exceed the burned minimum.
    #[error("liquidity below the bootstrap minimum")]
    BelowMinimumLiquidity,

    /// A liquidity or swap delta that must be strictly positive was not.
    #[error("delta must be strictly positive")]
    ZeroLiquidity,

    /// Position smaller than the requested removal.
    #[error("insufficient position")]
    InsufficientPosition,

    /// Margin balance smaller than the requested debit.
    #[error("insufficient margin")]
    InsufficientMargin,

    /// Swap rejected: output would drain the reserve, undercut the
    /// caller's minimum, or let the invariant decrease.
    #[error("swap output rejected")]
    DeltaOut,

    /// A funding callback returned without delivering the amounts due.
    #[error("funding callback under-delivered")]
    FundingShortfall,

    /// Reentrant call observed while a state transition was in flight.
    #[error("engine is locked")]
    EngineLocked,

    /// The token ledger rejected an outbound transfer.
    #[error("token transfer failed: {0}")]
    Transfer(#[from] LedgerError),

    #[error(transparent)]
    Math(#[from] MathError),
}

impl From<FixedPointError> for EngineError {
    fn from(err: FixedPointError) -> Self {
        EngineError::Math(MathError::from(err))
    }
}
