//! Engine core state machine.
//!
//! Every public operation follows the same shape: take the reentrancy
//! lock, read the records it needs into copies, compute the full
//! transition, settle tokens through the collaborators, then commit all
//! writes at once. A failure anywhere before the commit leaves stored
//! state untouched.

use std::collections::HashMap;

use rmm_fixed::{Q64, Rounding};
use rmm_math::{invariant, risky_given_stable, stable_given_risky, norm_cdf, years_between};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::ledger::{FundingCallback, FundingSource, TokenLedger};
use crate::pool_id::PoolId;
use crate::state::{Address, Calibration, Margin, Position, Reserve};

/// Protocol parameters fixed at engine construction.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Swap fee in basis points, applied to the input amount.
    pub fee_bps: u32,
    /// Liquidity permanently burned at pool creation.
    pub min_liquidity: Q64,
    /// Slack allowed when requiring the invariant not to decrease,
    /// covering truncation in the curve evaluation.
    pub invariant_tolerance: Q64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fee_bps: 15,
            min_liquidity: Q64::from_raw(1_000),
            // 2^-10, comfortably above observed curve truncation error.
            invariant_tolerance: Q64::from_raw(1 << 54),
        }
    }
}

/// Result of a successful pool creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Created {
    pub pool_id: PoolId,
    /// Risky tokens the creator supplied.
    pub del_risky: Q64,
    /// Stable tokens the creator supplied.
    pub del_stable: Q64,
}

/// Covered-call replication engine over a token ledger `L`.
pub struct Engine<L: TokenLedger> {
    address: Address,
    config: EngineConfig,
    ledger: L,
    calibrations: HashMap<PoolId, Calibration>,
    reserves: HashMap<PoolId, Reserve>,
    positions: HashMap<(Address, PoolId), Position>,
    margins: HashMap<Address, Margin>,
    locked: bool,
}

impl<L: TokenLedger> Engine<L> {
    /// `fee_bps` must be below 10_000.
    pub fn new(address: Address, config: EngineConfig, ledger: L) -> Self {
        assert!(config.fee_bps < 10_000, "fee must be below 100%");
        Self {
            address,
            config,
            ledger,
            calibrations: HashMap::new(),
            reserves: HashMap::new(),
            positions: HashMap::new(),
            margins: HashMap::new(),
            locked: false,
        }
    }

    /// Pool id for a calibration triple, computable before creation.
    pub fn get_pool_id(&self, strike: Q64, sigma: Q64, maturity: u64) -> PoolId {
        PoolId::derive(self.address, strike, sigma, maturity)
    }

    pub fn calibration(&self, pool_id: PoolId) -> Option<Calibration> {
        self.calibrations.get(&pool_id).copied()
    }

    pub fn reserve(&self, pool_id: PoolId) -> Option<Reserve> {
        self.reserves.get(&pool_id).copied()
    }

    pub fn margin(&self, owner: Address) -> Margin {
        self.margins.get(&owner).copied().unwrap_or_default()
    }

    pub fn position(&self, owner: Address, pool_id: PoolId) -> Position {
        self.positions
            .get(&(owner, pool_id))
            .copied()
            .unwrap_or_default()
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// One minus the fee, as a Q64 multiplier on swap input.
    fn gamma(&self) -> Q64 {
        let bps = (10_000 - self.config.fee_bps) as i128;
        Q64::from_raw((bps << 64) / 10_000)
    }

    fn lock(&mut self) -> Result<(), EngineError> {
        if self.locked {
            return Err(EngineError::EngineLocked);
        }
        self.locked = true;
        Ok(())
    }

    /// Invoke the funding callback, then require the observed increase
    /// in engine holdings to cover the amounts due.
    fn pull_external(
        &mut self,
        callback: &mut dyn FundingCallback,
        data: &[u8],
        risky_due: Q64,
        stable_due: Q64,
    ) -> Result<(), EngineError> {
        let risky_before = self.ledger.risky_balance();
        let stable_before = self.ledger.stable_balance();

        callback
            .fund(&mut self.ledger, risky_due, stable_due, data)
            .map_err(|_| EngineError::FundingShortfall)?;

        let risky_ok = self
            .ledger
            .risky_balance()
            .checked_sub(risky_before)
            .map(|delta| delta >= risky_due)
            .unwrap_or(false);
        let stable_ok = self
            .ledger
            .stable_balance()
            .checked_sub(stable_before)
            .map(|delta| delta >= stable_due)
            .unwrap_or(false);
        if !risky_ok || !stable_ok {
            warn!(
                risky_due = %risky_due,
                stable_due = %stable_due,
                "funding callback under-delivered"
            );
            return Err(EngineError::FundingShortfall);
        }
        Ok(())
    }

    /// Stage the debit or pull for an operation's input tokens. Returns
    /// the caller's post-debit margin when funds came from margin; the
    /// caller commits it alongside the rest of the transition.
    fn source_funds(
        &mut self,
        caller: Address,
        source: FundingSource<'_>,
        risky_due: Q64,
        stable_due: Q64,
    ) -> Result<Option<Margin>, EngineError> {
        match source {
            FundingSource::Margin => {
                let updated = self.margin(caller).debited(risky_due, stable_due)?;
                Ok(Some(updated))
            }
            FundingSource::External { callback, data } => {
                self.pull_external(callback, data, risky_due, stable_due)?;
                Ok(None)
            }
        }
    }

    /// Pay tokens out of engine holdings to `to`, checking holdings
    /// first so a rejected transfer cannot leave a half-paid state.
    fn pay_out(&mut self, to: Address, risky: Q64, stable: Q64) -> Result<(), EngineError> {
        if self.ledger.risky_balance() < risky || self.ledger.stable_balance() < stable {
            return Err(EngineError::Transfer(
                crate::ledger::LedgerError::InsufficientHoldings,
            ));
        }
        if !risky.is_zero() {
            self.ledger.transfer_risky(to, risky)?;
        }
        if !stable.is_zero() {
            self.ledger.transfer_stable(to, stable)?;
        }
        Ok(())
    }

    pub fn create(
        &mut self,
        caller: Address,
        now: u64,
        strike: Q64,
        sigma: Q64,
        maturity: u64,
        initial_delta: Q64,
        del_liquidity: Q64,
        callback: &mut dyn FundingCallback,
        data: &[u8],
    ) -> Result<Created, EngineError> {
        self.lock()?;
        let result = self.create_inner(
            caller,
            now,
            strike,
            sigma,
            maturity,
            initial_delta,
            del_liquidity,
            callback,
            data,
        );
        self.locked = false;
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn create_inner(
        &mut self,
        caller: Address,
        now: u64,
        strike: Q64,
        sigma: Q64,
        maturity: u64,
        initial_delta: Q64,
        del_liquidity: Q64,
        callback: &mut dyn FundingCallback,
        data: &[u8],
    ) -> Result<Created, EngineError> {
        let calibration = Calibration {
            strike,
            sigma,
            maturity,
            last_timestamp: now,
        };
        calibration.validate(now)?;

        if del_liquidity <= self.config.min_liquidity {
            return Err(EngineError::BelowMinimumLiquidity);
        }

        let pool_id = self.get_pool_id(strike, sigma, maturity);
        if self.calibrations.contains_key(&pool_id) {
            return Err(EngineError::PoolAlreadyExists);
        }

        let tau = years_between(now, maturity);
        // Risky per unit of liquidity replicating a call with the
        // requested delta: x = 1 - N(d).
        let fraction = Q64::ONE.checked_sub(norm_cdf(initial_delta)?)?;
        if fraction <= Q64::ZERO || fraction >= Q64::ONE {
            return Err(EngineError::InvalidCalibration {
                context: "initial delta maps outside the open unit interval",
            });
        }

        let del_risky = del_liquidity.mul_div(fraction, Q64::ONE, Rounding::Up)?;
        let del_stable = stable_given_risky(del_risky, del_liquidity, strike, sigma, tau)?;

        self.pull_external(callback, data, del_risky, del_stable)?;

        let reserve = Reserve {
            reserve_risky: del_risky,
            reserve_stable: del_stable,
            liquidity: del_liquidity,
        };
        // The burned minimum belongs to no owner.
        let minted = del_liquidity.checked_sub(self.config.min_liquidity)?;

        self.calibrations.insert(pool_id, calibration);
        self.reserves.insert(pool_id, reserve);
        self.positions.insert(
            (caller, pool_id),
            Position {
                liquidity: minted,
                debt: Q64::ZERO,
            },
        );

        info!(
            pool = %pool_id,
            strike = %strike,
            sigma = %sigma,
            maturity,
            liquidity = %del_liquidity,
            "pool created"
        );
        Ok(Created {
            pool_id,
            del_risky,
            del_stable,
        })
    }

    pub fn deposit(
        &mut self,
        recipient: Address,
        del_risky: Q64,
        del_stable: Q64,
        callback: &mut dyn FundingCallback,
        data: &[u8],
    ) -> Result<(), EngineError> {
        self.lock()?;
        let result = self.deposit_inner(recipient, del_risky, del_stable, callback, data);
        self.locked = false;
        result
    }

    fn deposit_inner(
        &mut self,
        recipient: Address,
        del_risky: Q64,
        del_stable: Q64,
        callback: &mut dyn FundingCallback,
        data: &[u8],
    ) -> Result<(), EngineError> {
        if del_risky < Q64::ZERO || del_stable < Q64::ZERO {
            return Err(EngineError::ZeroLiquidity);
        }
        self.pull_external(callback, data, del_risky, del_stable)?;
        let updated = self.margin(recipient).credited(del_risky, del_stable)?;
        self.margins.insert(recipient, updated);
        debug!(recipient = %recipient, risky = %del_risky, stable = %del_stable, "margin deposit");
        Ok(())
    }

    pub fn withdraw(
        &mut self,
        caller: Address,
        recipient: Address,
        del_risky: Q64,
        del_stable: Q64,
    ) -> Result<(), EngineError> {
        self.lock()?;
        let result = self.withdraw_inner(caller, recipient, del_risky, del_stable);
        self.locked = false;
        result
    }

    fn withdraw_inner(
        &mut self,
        caller: Address,
        recipient: Address,
        del_risky: Q64,
        del_stable: Q64,
    ) -> Result<(), EngineError> {
        if del_risky < Q64::ZERO || del_stable < Q64::ZERO {
            return Err(EngineError::ZeroLiquidity);
        }
        let updated = self.margin(caller).debited(del_risky, del_stable)?;
        self.pay_out(recipient, del_risky, del_stable)?;
        self.margins.insert(caller, updated);
        debug!(caller = %caller, recipient = %recipient, risky = %del_risky, stable = %del_stable, "margin withdraw");
        Ok(())
    }

    pub fn allocate(
        &mut self,
        caller: Address,
        now: u64,
        pool_id: PoolId,
        recipient: Address,
        del_liquidity: Q64,
        source: FundingSource<'_>,
    ) -> Result<(Q64, Q64), EngineError> {
        self.lock()?;
        let result = self.allocate_inner(caller, now, pool_id, recipient, del_liquidity, source);
        self.locked = false;
        result
    }

    fn allocate_inner(
        &mut self,
        caller: Address,
        now: u64,
        pool_id: PoolId,
        recipient: Address,
        del_liquidity: Q64,
        source: FundingSource<'_>,
    ) -> Result<(Q64, Q64), EngineError> {
        if del_liquidity <= Q64::ZERO {
            return Err(EngineError::ZeroLiquidity);
        }
        let calibration = self
            .calibrations
            .get(&pool_id)
            .copied()
            .ok_or(EngineError::PoolNotFound)?;
        if now > calibration.maturity {
            return Err(EngineError::PoolExpired);
        }
        let reserve = self
            .reserves
            .get(&pool_id)
            .copied()
            .ok_or(EngineError::PoolNotFound)?;

        let (del_risky, del_stable) = reserve.allocate_amounts(del_liquidity)?;
        if del_risky.is_zero() && del_stable.is_zero() {
            return Err(EngineError::ZeroLiquidity);
        }

        let staged_margin = self.source_funds(caller, source, del_risky, del_stable)?;

        let new_reserve = reserve.with_allocated(del_risky, del_stable, del_liquidity)?;
        let mut position = self.position(recipient, pool_id);
        position.liquidity = position.liquidity.checked_add(del_liquidity)?;

        self.reserves.insert(pool_id, new_reserve);
        self.positions.insert((recipient, pool_id), position);
        if let Some(margin) = staged_margin {
            self.margins.insert(caller, margin);
        }

        debug!(
            pool = %pool_id,
            recipient = %recipient,
            liquidity = %del_liquidity,
            risky = %del_risky,
            stable = %del_stable,
            "liquidity allocated"
        );
        Ok((del_risky, del_stable))
    }

    pub fn remove(
        &mut self,
        caller: Address,
        pool_id: PoolId,
        del_liquidity: Q64,
        to_margin: bool,
    ) -> Result<(Q64, Q64), EngineError> {
        self.lock()?;
        let result = self.remove_inner(caller, pool_id, del_liquidity, to_margin);
        self.locked = false;
        result
    }

    fn remove_inner(
        &mut self,
        caller: Address,
        pool_id: PoolId,
        del_liquidity: Q64,
        to_margin: bool,
    ) -> Result<(Q64, Q64), EngineError> {
        if del_liquidity <= Q64::ZERO {
            return Err(EngineError::ZeroLiquidity);
        }
        let reserve = self
            .reserves
            .get(&pool_id)
            .copied()
            .ok_or(EngineError::PoolNotFound)?;
        let mut position = self.position(caller, pool_id);
        if position.liquidity < del_liquidity {
            return Err(EngineError::InsufficientPosition);
        }

        let (del_risky, del_stable) = reserve.remove_amounts(del_liquidity)?;
        let new_reserve = reserve.with_removed(del_risky, del_stable, del_liquidity)?;
        position.liquidity = position.liquidity.checked_sub(del_liquidity)?;

        let staged_margin = if to_margin {
            Some(self.margin(caller).credited(del_risky, del_stable)?)
        } else {
            self.pay_out(caller, del_risky, del_stable)?;
            None
        };

        self.reserves.insert(pool_id, new_reserve);
        if position.is_empty() {
            self.positions.remove(&(caller, pool_id));
        } else {
            self.positions.insert((caller, pool_id), position);
        }
        if let Some(margin) = staged_margin {
            self.margins.insert(caller, margin);
        }

        debug!(
            pool = %pool_id,
            caller = %caller,
            liquidity = %del_liquidity,
            risky = %del_risky,
            stable = %del_stable,
            "liquidity removed"
        );
        Ok((del_risky, del_stable))
    }

    pub fn swap(
        &mut self,
        caller: Address,
        now: u64,
        pool_id: PoolId,
        risky_for_stable: bool,
        delta_in: Q64,
        delta_out_min: Option<Q64>,
        source: FundingSource<'_>,
    ) -> Result<Q64, EngineError> {
        self.lock()?;
        let result = self.swap_inner(
            caller,
            now,
            pool_id,
            risky_for_stable,
            delta_in,
            delta_out_min,
            source,
        );
        self.locked = false;
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn swap_inner(
        &mut self,
        caller: Address,
        now: u64,
        pool_id: PoolId,
        risky_for_stable: bool,
        delta_in: Q64,
        delta_out_min: Option<Q64>,
        source: FundingSource<'_>,
    ) -> Result<Q64, EngineError> {
        if delta_in <= Q64::ZERO {
            return Err(EngineError::ZeroLiquidity);
        }
        let mut calibration = self
            .calibrations
            .get(&pool_id)
            .copied()
            .ok_or(EngineError::PoolNotFound)?;
        if now >= calibration.maturity {
            return Err(EngineError::PoolExpired);
        }
        let reserve = self
            .reserves
            .get(&pool_id)
            .copied()
            .ok_or(EngineError::PoolNotFound)?;

        // Time only moves forward, never past maturity.
        let new_last = now.clamp(calibration.last_timestamp, calibration.maturity);
        let tau = years_between(new_last, calibration.maturity);

        let invariant_before = invariant(
            reserve.reserve_risky,
            reserve.reserve_stable,
            reserve.liquidity,
            calibration.strike,
            calibration.sigma,
            tau,
        )?;

        let effective_in = delta_in.mul_div(self.gamma(), Q64::ONE, Rounding::Down)?;

        let (new_reserve, delta_out) = if risky_for_stable {
            let committed_risky = reserve.reserve_risky.checked_add(delta_in)?;
            if committed_risky > reserve.liquidity {
                return Err(EngineError::DeltaOut);
            }
            let effective_risky = reserve.reserve_risky.checked_add(effective_in)?;
            // Fees accrue into the invariant; pricing carries the
            // accrued surplus forward so it is never swapped out.
            let implied_stable = stable_given_risky(
                effective_risky,
                reserve.liquidity,
                calibration.strike,
                calibration.sigma,
                tau,
            )?
            .checked_add(invariant_before)?;
            if implied_stable >= reserve.reserve_stable {
                return Err(EngineError::DeltaOut);
            }
            let delta_out = reserve.reserve_stable.checked_sub(implied_stable)?;
            (
                Reserve {
                    reserve_risky: committed_risky,
                    reserve_stable: reserve.reserve_stable.checked_sub(delta_out)?,
                    liquidity: reserve.liquidity,
                },
                delta_out,
            )
        } else {
            let committed_stable = reserve.reserve_stable.checked_add(delta_in)?;
            let stable_cap = calibration
                .strike
                .mul_div(reserve.liquidity, Q64::ONE, Rounding::Down)?;
            if committed_stable > stable_cap {
                return Err(EngineError::DeltaOut);
            }
            let effective_stable = reserve.reserve_stable.checked_add(effective_in)?;
            let adjusted_stable = effective_stable.checked_sub(invariant_before)?;
            if adjusted_stable < Q64::ZERO || adjusted_stable > stable_cap {
                return Err(EngineError::DeltaOut);
            }
            let implied_risky = risky_given_stable(
                adjusted_stable,
                reserve.liquidity,
                calibration.strike,
                calibration.sigma,
                tau,
            )?;
            if implied_risky >= reserve.reserve_risky {
                return Err(EngineError::DeltaOut);
            }
            let delta_out = reserve.reserve_risky.checked_sub(implied_risky)?;
            (
                Reserve {
                    reserve_risky: reserve.reserve_risky.checked_sub(delta_out)?,
                    reserve_stable: committed_stable,
                    liquidity: reserve.liquidity,
                },
                delta_out,
            )
        };

        let invariant_after = invariant(
            new_reserve.reserve_risky,
            new_reserve.reserve_stable,
            new_reserve.liquidity,
            calibration.strike,
            calibration.sigma,
            tau,
        )?;
        // Curve evaluation error is proportional to pool size, so the
        // allowed slack grows with liquidity above one unit.
        let tolerance = self
            .config
            .invariant_tolerance
            .mul_div(reserve.liquidity.max(Q64::ONE), Q64::ONE, Rounding::Up)?;
        if invariant_after.checked_add(tolerance)? < invariant_before {
            return Err(EngineError::DeltaOut);
        }
        if let Some(minimum) = delta_out_min {
            if delta_out < minimum {
                return Err(EngineError::DeltaOut);
            }
        }

        let (risky_due, stable_due) = if risky_for_stable {
            (delta_in, Q64::ZERO)
        } else {
            (Q64::ZERO, delta_in)
        };
        let from_margin = matches!(source, FundingSource::Margin);
        let staged_margin = self.source_funds(caller, source, risky_due, stable_due)?;

        // Output settles symmetrically to the input side.
        let staged_margin = if from_margin {
            let base = staged_margin.unwrap_or_else(|| self.margin(caller));
            let credited = if risky_for_stable {
                base.credited(Q64::ZERO, delta_out)?
            } else {
                base.credited(delta_out, Q64::ZERO)?
            };
            Some(credited)
        } else {
            if risky_for_stable {
                self.pay_out(caller, Q64::ZERO, delta_out)?;
            } else {
                self.pay_out(caller, delta_out, Q64::ZERO)?;
            }
            staged_margin
        };

        calibration.last_timestamp = new_last;
        self.calibrations.insert(pool_id, calibration);
        self.reserves.insert(pool_id, new_reserve);
        if let Some(margin) = staged_margin {
            self.margins.insert(caller, margin);
        }

        debug!(
            pool = %pool_id,
            caller = %caller,
            risky_for_stable,
            delta_in = %delta_in,
            delta_out = %delta_out,
            invariant_before = %invariant_before,
            invariant_after = %invariant_after,
            "swap"
        );
        Ok(delta_out)
    }
}
