//! Evaluation error types.

use rulebank_core::{EntityKey, ValueError};
use thiserror::Error;

/// Result type for evaluation.
pub type EvalResult<T> = Result<T, EvaluationError>;

/// Errors raised while recomputing derived attributes.
/// Any of these aborts the unit of work.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("{rule} failed for {key}: {message}")]
    Formula {
        rule: String,
        key: EntityKey,
        message: String,
    },

    #[error("{rule} overflowed for {key}: {source}")]
    Overflow {
        rule: String,
        key: EntityKey,
        source: ValueError,
    },

    #[error("{rule} produced a mismatched value for {key}: {message}")]
    TypeMismatch {
        rule: String,
        key: EntityKey,
        message: String,
    },

    #[error("{rule}: {child} references missing parent {parent}")]
    MissingParent {
        rule: String,
        child: EntityKey,
        parent: EntityKey,
    },

    #[error("Maximum tasks ({limit}) exceeded")]
    TaskLimitExceeded { limit: usize },
}

impl EvaluationError {
    pub fn formula(rule: impl Into<String>, key: EntityKey, message: impl Into<String>) -> Self {
        Self::Formula {
            rule: rule.into(),
            key,
            message: message.into(),
        }
    }

    pub fn type_mismatch(rule: impl Into<String>, key: EntityKey, message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            rule: rule.into(),
            key,
            message: message.into(),
        }
    }

    /// Map an arithmetic failure of `rule` on `key`.
    pub fn from_value(rule: impl Into<String>, key: EntityKey, err: ValueError) -> Self {
        match err {
            ValueError::Overflow { .. } => Self::Overflow {
                rule: rule.into(),
                key,
                source: err,
            },
            other => Self::type_mismatch(rule, key, other.to_string()),
        }
    }

    pub fn task_limit_exceeded(limit: usize) -> Self {
        Self::TaskLimitExceeded { limit }
    }
}
