//! Commit gate: collect, evaluate, check, then persist or abort.

use rulebank_constraint::{ConstraintChecker, RowState, Violations};
use rulebank_core::{ChangeSet, Persistence, RowWrite};
use rulebank_graph::DependencyGraph;
use rulebank_registry::RuleSet;
use rulebank_rule::{EngineConfig, EvaluationStats, Evaluator};
use tracing::{debug, warn};

use crate::buffer::ChangeBuffer;
use crate::collector::ChangeCollector;
use crate::error::{TransactionError, TransactionResult};
use crate::unit_of_work::UnitOfWorkState;

/// Outcome of a committed unit of work.
#[derive(Debug, Clone)]
pub struct CommitSummary {
    /// Application changes followed by derived changes, as persisted.
    pub changes: ChangeSet,
    /// Soft constraint violations.
    pub warnings: Violations,
    /// Evaluator counters for this commit.
    pub stats: EvaluationStats,
}

/// Runs one unit of work through Collecting, Evaluating and Checking.
pub struct CommitGate<'r> {
    rules: &'r RuleSet,
    graph: &'r DependencyGraph,
    config: &'r EngineConfig,
}

impl<'r> CommitGate<'r> {
    pub fn new(rules: &'r RuleSet, graph: &'r DependencyGraph, config: &'r EngineConfig) -> Self {
        Self {
            rules,
            graph,
            config,
        }
    }

    /// Settle the buffered writes and apply them to `store` atomically.
    ///
    /// On any error nothing is applied. `state` is advanced through the
    /// intermediate states; the caller sets the terminal one.
    pub fn commit<P: Persistence>(
        &self,
        store: &mut P,
        buffer: &ChangeBuffer,
        state: &mut UnitOfWorkState,
    ) -> TransactionResult<CommitSummary> {
        let (writes, summary) = {
            transition(state, UnitOfWorkState::Collecting);
            let (mut ws, initial) = ChangeCollector::new(self.rules).collect(buffer, &*store)?;

            transition(state, UnitOfWorkState::Evaluating);
            let evaluation = Evaluator::new(self.rules, self.graph, self.config).run(&mut ws, initial)?;

            transition(state, UnitOfWorkState::Checking);
            let touched = evaluation.changes.touched_keys();
            let rows = ws
                .touched_keys()
                .filter(|key| touched.contains(key) || ws.is_inserted(*key))
                .filter_map(|key| ws.row(key).map(|row| RowState::new(row, ws.prior(key))));
            let violations = ConstraintChecker::new(self.rules).check(rows);

            if violations.has_errors() {
                debug!(
                    target: "rulebank::logic",
                    errors = violations.errors().count(),
                    warnings = violations.warnings().count(),
                    "unit of work rejected"
                );
                return Err(TransactionError::ConstraintViolations(violations));
            }
            for violation in &violations {
                warn!(target: "rulebank::logic", constraint = %violation.constraint_name, key = %violation.key, "{}", violation.message);
            }

            let writes: Vec<RowWrite> = ws.writes();
            (
                writes,
                CommitSummary {
                    changes: evaluation.changes,
                    warnings: violations,
                    stats: evaluation.stats,
                },
            )
        };

        store.apply(&writes)?;
        debug!(
            target: "rulebank::engine",
            writes = writes.len(),
            records = summary.changes.len(),
            "unit of work persisted"
        );
        Ok(summary)
    }
}

/// Advance the state machine.
pub(crate) fn transition(state: &mut UnitOfWorkState, next: UnitOfWorkState) {
    debug!(target: "rulebank::engine", from = ?*state, to = ?next, "unit of work state");
    *state = next;
}
