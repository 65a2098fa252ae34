//! Deterministic Q64.64 fixed-point arithmetic
//!
//! The replication curve must evaluate bit-identically for every caller,
//! so all math in this workspace runs on scaled integers rather than
//! floating point. This crate provides the signed Q64.64 type (64
//! integer bits, 64 fractional bits), overflow-checked arithmetic with
//! full-precision 256-bit intermediates, and the elementary functions
//! (exp, ln, sqrt) the curve evaluation needs.
//!
//! Every operation either returns a representable value or fails with a
//! [`FixedPointError`]; there is no silent wraparound anywhere.

pub mod error;
pub mod q64;
pub mod transcendental;
pub mod wide;

pub use error::FixedPointError;
pub use q64::{Q64, Rounding};
