//! Token movement collaborators.
//!
//! The engine never holds token transfer logic itself. It observes its
//! own holdings through [`TokenLedger`] and asks collaborators to move
//! tokens, then reconciles balances before committing state.

use std::collections::HashMap;

use rmm_fixed::Q64;
use thiserror::Error;

use crate::state::Address;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Outbound transfer larger than the engine's holdings.
    #[error("insufficient engine holdings")]
    InsufficientHoldings,

    /// The collaborator refused the operation.
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// View of the engine's own token holdings plus outbound transfers.
pub trait TokenLedger {
    /// Risky tokens currently held by the engine.
    fn risky_balance(&self) -> Q64;
    /// Stable tokens currently held by the engine.
    fn stable_balance(&self) -> Q64;

    /// Record tokens arriving at the engine. Invoked by funding
    /// callbacks, never by the engine core.
    fn credit_risky(&mut self, amount: Q64);
    fn credit_stable(&mut self, amount: Q64);

    /// Move tokens from engine holdings to `to`.
    fn transfer_risky(&mut self, to: Address, amount: Q64) -> Result<(), LedgerError>;
    fn transfer_stable(&mut self, to: Address, amount: Q64) -> Result<(), LedgerError>;
}

/// Callback the engine invokes to pull funds in.
///
/// After `fund` returns, the engine re-measures its holdings and
/// requires the observed increase to cover the amounts due.
pub trait FundingCallback {
    fn fund(
        &mut self,
        ledger: &mut dyn TokenLedger,
        risky_due: Q64,
        stable_due: Q64,
        data: &[u8],
    ) -> Result<(), LedgerError>;
}

/// Where an operation's input tokens come from.
pub enum FundingSource<'a> {
    /// Debit the caller's margin account.
    Margin,
    /// Pull tokens through an external callback, reconciled against
    /// observed balance deltas.
    External {
        callback: &'a mut dyn FundingCallback,
        data: &'a [u8],
    },
}

/// In-memory ledger tracking engine holdings and per-recipient payouts.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    risky: Q64,
    stable: Q64,
    received: HashMap<Address, (Q64, Q64)>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Risky tokens paid out to `who` over the ledger's lifetime.
    pub fn received_risky(&self, who: Address) -> Q64 {
        self.received.get(&who).map(|r| r.0).unwrap_or(Q64::ZERO)
    }

    pub fn received_stable(&self, who: Address) -> Q64 {
        self.received.get(&who).map(|r| r.1).unwrap_or(Q64::ZERO)
    }
}

impl TokenLedger for MemoryLedger {
    fn risky_balance(&self) -> Q64 {
        self.risky
    }

    fn stable_balance(&self) -> Q64 {
        self.stable
    }

    fn credit_risky(&mut self, amount: Q64) {
        self.risky = self.risky.saturating_add(amount);
    }

    fn credit_stable(&mut self, amount: Q64) {
        self.stable = self.stable.saturating_add(amount);
    }

    fn transfer_risky(&mut self, to: Address, amount: Q64) -> Result<(), LedgerError> {
        if amount > self.risky {
            return Err(LedgerError::InsufficientHoldings);
        }
        self.risky = self.risky.saturating_sub(amount);
        let entry = self.received.entry(to).or_default();
        entry.0 = entry.0.saturating_add(amount);
        Ok(())
    }

    fn transfer_stable(&mut self, to: Address, amount: Q64) -> Result<(), LedgerError> {
        if amount > self.stable {
            return Err(LedgerError::InsufficientHoldings);
        }
        self.stable = self.stable.saturating_sub(amount);
        let entry = self.received.entry(to).or_default();
        entry.1 = entry.1.saturating_add(amount);
        Ok(())
    }
}

/// Funding callback that always delivers exactly what is asked.
#[derive(Debug, Default)]
pub struct HonestFunder;

impl FundingCallback for HonestFunder {
    fn fund(
        &mut self,
        ledger: &mut dyn TokenLedger,
        risky_due: Q64,
        stable_due: Q64,
        _data: &[u8],
    ) -> Result<(), LedgerError> {
        ledger.credit_risky(risky_due);
        ledger.credit_stable(stable_due);
        Ok(())
    }
}
