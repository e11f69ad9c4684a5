//! Configuration error types.

use thiserror::Error;

/// Result type for rule declaration and graph construction.
pub type ConfigResult<T> = Result<T, ConfigurationError>;

/// Errors in the declared rule set. Any of these prevents activation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Duplicate type name: {0}")]
    DuplicateType(String),

    #[error("Duplicate attribute {attr} on type {type_name}")]
    DuplicateAttribute { type_name: String, attr: String },

    #[error("Duplicate relationship name: {0}")]
    DuplicateRelationship(String),

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Unknown attribute {attr} on type {type_name}")]
    UnknownAttribute { type_name: String, attr: String },

    #[error("Unknown relationship: {0}")]
    UnknownRelationship(String),

    #[error("No relationship from {parent} to {child}")]
    NoRelationship { parent: String, child: String },

    #[error("Several relationships from {parent} to {child}; name one with via()")]
    AmbiguousRelationship { parent: String, child: String },

    #[error("Declaration {declaration} is missing its {clause} clause")]
    MissingClause { declaration: String, clause: String },

    #[error("Conflicting derivations for {target}: {existing} and {declared}")]
    ConflictingDerivation {
        target: String,
        existing: String,
        declared: String,
    },

    #[error("Conflicting declarations for constraint {0}")]
    ConflictingConstraint(String),

    #[error("Foreign key {0} cannot be a derived attribute")]
    DerivedForeignKey(String),

    #[error("Kind mismatch on {attr}: expected {expected}, declared {actual}")]
    KindMismatch {
        attr: String,
        expected: String,
        actual: String,
    },

    #[error("Dependency cycle: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Redeclaration changes stored {what}: {detail}")]
    IncompatibleRedeclaration { what: String, detail: String },
}

impl ConfigurationError {
    pub fn unknown_attribute(type_name: impl Into<String>, attr: impl Into<String>) -> Self {
        Self::UnknownAttribute {
            type_name: type_name.into(),
            attr: attr.into(),
        }
    }

    pub fn kind_mismatch(
        attr: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::KindMismatch {
            attr: attr.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn missing_clause(declaration: impl Into<String>, clause: impl Into<String>) -> Self {
        Self::MissingClause {
            declaration: declaration.into(),
            clause: clause.into(),
        }
    }

    pub fn cycle(path: Vec<String>) -> Self {
        Self::Cycle { path }
    }

    pub fn incompatible(what: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::IncompatibleRedeclaration {
            what: what.into(),
            detail: detail.into(),
        }
    }
}
