//! Constraint violation types.

use std::fmt;

use rulebank_core::EntityKey;
use rulebank_registry::Severity;

/// A constraint that failed for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// The constraint that was violated.
    pub constraint_name: String,
    /// Hard violations abort the unit of work, soft ones are reported.
    pub severity: Severity,
    /// Rendered message.
    pub message: String,
    /// The row that failed the predicate.
    pub key: EntityKey,
    /// Type of that row.
    pub type_name: String,
}

impl Violation {
    /// Create a new violation.
    pub fn new(
        constraint_name: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        key: EntityKey,
        type_name: impl Into<String>,
    ) -> Self {
        Self {
            constraint_name: constraint_name.into(),
            severity,
            message: message.into(),
            key,
            type_name: type_name.into(),
        }
    }

    /// Check if this violation aborts the unit of work.
    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Hard)
    }

    /// Check if this violation is a warning only.
    pub fn is_warning(&self) -> bool {
        matches!(self.severity, Severity::Soft)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {} {}: {}",
            self.constraint_name, self.type_name, self.key, self.message
        )
    }
}

/// Collection of violations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Violations {
    violations: Vec<Violation>,
}

impl Violations {
    /// Create a new empty violations collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a violation.
    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    /// Check if there are any violations.
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Check if there are any hard violations.
    pub fn has_errors(&self) -> bool {
        self.violations.iter().any(|v| v.is_error())
    }

    /// Check if there are only warnings.
    pub fn has_only_warnings(&self) -> bool {
        !self.violations.is_empty() && !self.has_errors()
    }

    /// Get all violations.
    pub fn all(&self) -> &[Violation] {
        &self.violations
    }

    /// Get hard violations.
    pub fn errors(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.is_error())
    }

    /// Get soft violations.
    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.is_warning())
    }

    /// Get the number of violations.
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// Merge another violations collection.
    pub fn merge(&mut self, other: Violations) {
        self.violations.extend(other.violations);
    }

    /// Split into (hard, soft).
    pub fn partition(self) -> (Violations, Violations) {
        let (errors, warnings) = self.violations.into_iter().partition(|v| v.is_error());
        (
            Violations { violations: errors },
            Violations {
                violations: warnings,
            },
        )
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

impl IntoIterator for Violations {
    type Item = Violation;
    type IntoIter = std::vec::IntoIter<Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.violations.into_iter()
    }
}

impl<'a> IntoIterator for &'a Violations {
    type Item = &'a Violation;
    type IntoIter = std::slice::Iter<'a, Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.violations.iter()
    }
}
