//! Common error types for rulebank.

use crate::{EntityKey, TypeId};
use thiserror::Error;

/// Errors raised by the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row not found.
    #[error("Row not found: {0}")]
    RowNotFound(EntityKey),

    /// A row with this key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(EntityKey),

    /// A write changed the type of an existing row.
    #[error("Type changed for {key}: stored as {stored}, written as {written}")]
    TypeChanged {
        key: EntityKey,
        stored: TypeId,
        written: TypeId,
    },

    /// Invalid write.
    #[error("Invalid write: {0}")]
    InvalidWrite(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from value arithmetic.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    /// Checked integer arithmetic overflowed.
    #[error("Integer overflow adding {left} and {right}")]
    Overflow { left: i64, right: i64 },

    /// Operand does not match the arithmetic kind.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    Mismatch { expected: String, actual: String },

    /// Arithmetic requested for a non-numeric kind.
    #[error("Kind {kind} is not numeric")]
    NotNumeric { kind: String },
}
