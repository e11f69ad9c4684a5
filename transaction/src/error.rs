//! Transaction error types.

use rulebank_constraint::Violations;
use rulebank_core::StoreError;
use rulebank_registry::ConfigurationError;
use rulebank_rule::EvaluationError;
use thiserror::Error;

use crate::unit_of_work::UnitOfWorkState;

/// Transaction errors.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Unknown entity type.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// Unknown attribute of a type.
    #[error("unknown attribute {type_name}.{attr}")]
    UnknownAttribute { type_name: String, attr: String },

    /// Application code wrote an attribute owned by a derivation rule.
    #[error("{type_name}.{attr} is derived and cannot be written")]
    DerivedAttributeWrite { type_name: String, attr: String },

    /// A written value does not match the declared kind.
    #[error("{type_name}.{attr} expects {expected}, got {actual}")]
    KindMismatch {
        type_name: String,
        attr: String,
        expected: String,
        actual: String,
    },

    /// The unit of work was already committed or aborted.
    #[error("unit of work is {0:?}")]
    Finalized(UnitOfWorkState),

    /// The rules were redeclared after this unit of work began.
    #[error("rules were redeclared while the unit of work was open")]
    RulesRedeclared,

    /// Hard constraints failed; nothing was persisted.
    #[error("constraint violations: {0}")]
    ConstraintViolations(Violations),

    /// Evaluation failed; nothing was persisted.
    #[error("evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    /// Persistence error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Rules could not be compiled.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl TransactionError {
    pub fn unknown_attribute(type_name: impl Into<String>, attr: impl Into<String>) -> Self {
        Self::UnknownAttribute {
            type_name: type_name.into(),
            attr: attr.into(),
        }
    }

    pub fn derived_attribute_write(type_name: impl Into<String>, attr: impl Into<String>) -> Self {
        Self::DerivedAttributeWrite {
            type_name: type_name.into(),
            attr: attr.into(),
        }
    }

    pub fn kind_mismatch(
        type_name: impl Into<String>,
        attr: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::KindMismatch {
            type_name: type_name.into(),
            attr: attr.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// The violations carried by an aborted commit, if any.
    pub fn violations(&self) -> Option<&Violations> {
        match self {
            Self::ConstraintViolations(violations) => Some(violations),
            _ => None,
        }
    }
}

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;
