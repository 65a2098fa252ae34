//! Pool state records.
//!
//! Each record is a plain value type. Transition helpers compute a new
//! record from a copy and return it, so callers can validate everything
//! before committing and never observe a half-applied update.

use std::fmt;

use rmm_fixed::{Q64, Rounding};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Account identifier, 20 raw bytes rendered as 0x-prefixed hex.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Convenience constructor filling all 20 bytes with one value.
    pub const fn repeat(byte: u8) -> Self {
        Address([byte; 20])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }
}

/// Immutable curve parameters plus the timestamp of the last trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calibration {
    /// Strike price, stable per risky.
    pub strike: Q64,
    /// Annualized implied volatility.
    pub sigma: Q64,
    /// Unix timestamp at which the pool stops trading.
    pub maturity: u64,
    /// Unix timestamp of the most recent swap, never past maturity.
    pub last_timestamp: u64,
}

impl Calibration {
    pub fn validate(&self, now: u64) -> Result<(), EngineError> {
        if self.strike <= Q64::ZERO {
            return Err(EngineError::InvalidCalibration {
                context: "strike must be positive",
            });
        }
        if self.sigma <= Q64::ZERO {
            return Err(EngineError::InvalidCalibration {
                context: "sigma must be positive",
            });
        }
        if self.maturity <= now {
            return Err(EngineError::InvalidCalibration {
                context: "maturity must be in the future",
            });
        }
        Ok(())
    }
}

/// Token reserves and total liquidity of one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserve {
    pub reserve_risky: Q64,
    pub reserve_stable: Q64,
    pub liquidity: Q64,
}

impl Reserve {
    /// Token amounts owed for minting `del_liquidity`, pro rata against
    /// current reserves and rounded up so the pool never under-collects.
    pub fn allocate_amounts(&self, del_liquidity: Q64) -> Result<(Q64, Q64), EngineError> {
        let del_risky = self
            .reserve_risky
            .mul_div(del_liquidity, self.liquidity, Rounding::Up)?;
        let del_stable = self
            .reserve_stable
            .mul_div(del_liquidity, self.liquidity, Rounding::Up)?;
        Ok((del_risky, del_stable))
    }

    /// Token amounts released for burning `del_liquidity`, rounded down.
    pub fn remove_amounts(&self, del_liquidity: Q64) -> Result<(Q64, Q64), EngineError> {
        let del_risky = self
            .reserve_risky
            .mul_div(del_liquidity, self.liquidity, Rounding::Down)?;
        let del_stable = self
            .reserve_stable
            .mul_div(del_liquidity, self.liquidity, Rounding::Down)?;
        Ok((del_risky, del_stable))
    }

    pub fn with_allocated(
        &self,
        del_risky: Q64,
        del_stable: Q64,
        del_liquidity: Q64,
    ) -> Result<Self, EngineError> {
        Ok(Reserve {
            reserve_risky: self.reserve_risky.checked_add(del_risky)?,
            reserve_stable: self.reserve_stable.checked_add(del_stable)?,
            liquidity: self.liquidity.checked_add(del_liquidity)?,
        })
    }

    pub fn with_removed(
        &self,
        del_risky: Q64,
        del_stable: Q64,
        del_liquidity: Q64,
    ) -> Result<Self, EngineError> {
        Ok(Reserve {
            reserve_risky: self.reserve_risky.checked_sub(del_risky)?,
            reserve_stable: self.reserve_stable.checked_sub(del_stable)?,
            liquidity: self.liquidity.checked_sub(del_liquidity)?,
        })
    }
}

/// Liquidity owned by one account in one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub liquidity: Q64,
    /// Borrowed-liquidity bookkeeping for lending extensions. Always
    /// zero in the base engine.
    pub debt: Q64,
}

impl Position {
    pub fn is_empty(&self) -> bool {
        self.liquidity.is_zero() && self.debt.is_zero()
    }
}

/// Internal token balances an account holds at the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Margin {
    pub balance_risky: Q64,
    pub balance_stable: Q64,
}

impl Margin {
    pub fn credited(&self, del_risky: Q64, del_stable: Q64) -> Result<Self, EngineError> {
        Ok(Margin {
            balance_risky: self.balance_risky.checked_add(del_risky)?,
            balance_stable: self.balance_stable.checked_add(del_stable)?,
        })
    }

    /// All-or-nothing debit. Fails without touching either side if one
    /// balance is short.
    pub fn debited(&self, del_risky: Q64, del_stable: Q64) -> Result<Self, EngineError> {
        if self.balance_risky < del_risky || self.balance_stable < del_stable {
            return Err(EngineError::InsufficientMargin);
        }
        Ok(Margin {
            balance_risky: self.balance_risky.checked_sub(del_risky)?,
            balance_stable: self.balance_stable.checked_sub(del_stable)?,
        })
    }
}
