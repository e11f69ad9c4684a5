//! Constraint checking.

use rulebank_registry::{ConstraintDef, RowState, RuleSet};
use tracing::{debug, trace};

use crate::template::render;
use crate::violation::{Violation, Violations};

/// Checks the settled rows of a unit of work against declared constraints.
pub struct ConstraintChecker<'r> {
    rules: &'r RuleSet,
}

impl<'r> ConstraintChecker<'r> {
    /// Create a new constraint checker.
    pub fn new(rules: &'r RuleSet) -> Self {
        Self { rules }
    }

    /// Check every constraint declared for the type of each row.
    ///
    /// Every row is checked and every violation is returned, hard or soft.
    pub fn check<'a>(&self, rows: impl IntoIterator<Item = RowState<'a>>) -> Violations {
        let mut violations = Violations::new();
        let mut checked = 0usize;

        for state in rows {
            for constraint in self.rules.constraints_for_type(state.row().type_id) {
                checked += 1;
                if let Some(violation) = self.check_constraint(constraint, &state) {
                    violations.push(violation);
                }
            }
        }

        trace!(target: "rulebank::engine", checked, violations = violations.len(), "constraints checked");
        violations
    }

    fn check_constraint(&self, constraint: &ConstraintDef, state: &RowState<'_>) -> Option<Violation> {
        let key = state.row().key;
        if constraint.predicate.eval(state) {
            trace!(target: "rulebank::logic", constraint = %constraint.name, key = %key, "constraint passed");
            return None;
        }

        let message = render(&constraint.message, state);
        debug!(
            target: "rulebank::logic",
            constraint = %constraint.name,
            key = %key,
            severity = ?constraint.severity,
            message = %message,
            "constraint violated"
        );
        Some(Violation::new(
            &constraint.name,
            constraint.severity,
            message,
            key,
            self.rules.type_name(constraint.type_id),
        ))
    }
}
