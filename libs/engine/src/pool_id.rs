//! Deterministic pool identifiers.

use std::fmt;

use rmm_fixed::Q64;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::state::Address;

/// Keccak-256 digest of the engine identity and the calibration triple.
///
/// Pure function of its inputs, so any party can predict a pool's id
/// before the pool is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoolId(pub [u8; 32]);

impl PoolId {
    pub fn derive(engine: Address, strike: Q64, sigma: Q64, maturity: u64) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(engine.0);
        hasher.update(maturity.to_be_bytes());
        hasher.update(sigma.raw().to_be_bytes());
        hasher.update(strike.raw().to_be_bytes());
        PoolId(hasher.finalize().into())
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Q64 {
        Q64::from_decimal_str(s).unwrap()
    }

    #[test]
    fn id_is_deterministic() {
        let engine = Address::repeat(0x11);
        let a = PoolId::derive(engine, q("1000"), q("0.85"), 1_700_000_000);
        let b = PoolId::derive(engine, q("1000"), q("0.85"), 1_700_000_000);
        assert_eq!(a, b);
    }

    #[test]
    fn id_depends_on_every_input() {
        let engine = Address::repeat(0x11);
        let base = PoolId::derive(engine, q("1000"), q("0.85"), 1_700_000_000);
        assert_ne!(
            base,
            PoolId::derive(Address::repeat(0x22), q("1000"), q("0.85"), 1_700_000_000)
        );
        assert_ne!(
            base,
            PoolId::derive(engine, q("1001"), q("0.85"), 1_700_000_000)
        );
        assert_ne!(
            base,
            PoolId::derive(engine, q("1000"), q("0.86"), 1_700_000_000)
        );
        assert_ne!(
            base,
            PoolId::derive(engine, q("1000"), q("0.85"), 1_700_000_001)
        );
    }

    #[test]
    fn id_displays_as_hex() {
        let id = PoolId([0u8; 32]);
        assert_eq!(id.to_string().len(), 2 + 64);
        assert!(id.to_string().starts_with("0x"));
    }
}
