//! Covered-call replication engine.
//!
//! Pools hold a risky and a stable token on the replicating curve for a
//! covered call (strike, implied volatility, maturity). The [`Engine`]
//! owns all pool records and exposes the six state transitions: create,
//! deposit, withdraw, allocate, remove, and swap. Token movement goes
//! through the [`ledger`] collaborators so the engine core stays a pure
//! state machine over its own bookkeeping.

pub mod engine;
pub mod error;
pub mod ledger;
pub mod pool_id;
pub mod state;

pub use engine::{Created, Engine, EngineConfig};
pub use error::EngineError;
pub use ledger::{
    FundingCallback, FundingSource, HonestFunder, LedgerError, MemoryLedger, TokenLedger,
};
pub use pool_id::PoolId;
pub use state::{Address, Calibration, Margin, Position, Reserve};
