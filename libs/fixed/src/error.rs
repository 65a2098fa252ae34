//! Error types for fixed-point arithmetic
//!
//! Overflow, division by zero, and conversion failures all surface as
//! distinct variants so callers can tell which contract was violated.

use thiserror::Error;

/// Errors that can occur during fixed-point arithmetic operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FixedPointError {
    /// Result exceeds the representable Q64.64 range
    #[error("arithmetic overflow: result exceeds the Q64.64 range")]
    Overflow,

    /// Division by zero in fixed-point arithmetic
    #[error("division by zero in fixed-point arithmetic")]
    DivisionByZero,

    /// Square root of a negative value
    #[error("square root of a negative value")]
    SqrtOfNegative,

    /// Natural logarithm of a non-positive value
    #[error("natural logarithm of a non-positive value")]
    LogNonPositive,

    /// Invalid decimal string format
    #[error("invalid decimal string: '{input}' - expected numeric format")]
    InvalidDecimal { input: String },
}
