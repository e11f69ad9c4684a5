//! Assertion types and builders for verifying commit outcomes.

use rulebank_transaction::{CommitSummary, TransactionResult};

use crate::error::{ScenarioError, ScenarioResult};

/// The outcome of `UnitOfWork::commit`.
pub type CommitOutcome = TransactionResult<CommitSummary>;

/// Expectations for one commit.
#[derive(Debug, Default)]
pub struct Assertion {
    pub committed: Option<bool>,

    // Aborted commits
    pub violations: Option<Vec<String>>,
    pub messages: Vec<String>,
    pub error: Option<String>,
    pub error_pattern: Option<String>,

    // Committed
    pub derived: Option<usize>,
    pub warnings: Option<Vec<String>>,
}

impl Assertion {
    /// Create a new empty assertion.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect the commit to succeed.
    pub fn committed(mut self) -> Self {
        self.committed = Some(true);
        self
    }

    /// Expect the commit to be aborted.
    pub fn aborted(mut self) -> Self {
        self.committed = Some(false);
        self
    }

    /// Expect exactly these hard violations, by constraint name, in order.
    pub fn violations(mut self, names: &[&str]) -> Self {
        self.committed = Some(false);
        self.violations = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    /// Expect a violation with exactly this rendered message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.committed = Some(false);
        self.messages.push(message.into());
        self
    }

    /// Expect an error whose text contains `fragment`.
    pub fn error(mut self, fragment: impl Into<String>) -> Self {
        self.committed = Some(false);
        self.error = Some(fragment.into());
        self
    }

    /// Expect an error whose text matches `pattern`.
    pub fn error_matches(mut self, pattern: impl Into<String>) -> Self {
        self.committed = Some(false);
        self.error_pattern = Some(pattern.into());
        self
    }

    /// Expect this many derived change records.
    pub fn derived(mut self, count: usize) -> Self {
        self.committed = Some(true);
        self.derived = Some(count);
        self
    }

    /// Expect exactly these soft violations, by constraint name, in order.
    pub fn warnings(mut self, names: &[&str]) -> Self {
        self.committed = Some(true);
        self.warnings = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    /// Verify the assertion against a commit outcome.
    pub fn verify(&self, step: &str, outcome: &CommitOutcome) -> ScenarioResult<()> {
        match (self.committed, outcome) {
            (Some(false), Ok(summary)) => Err(ScenarioError::assertion_failed(
                step,
                format!(
                    "expected abort, but committed {} changes",
                    summary.changes.len()
                ),
            )),
            (Some(true), Err(e)) => Err(ScenarioError::assertion_failed(
                step,
                format!("expected commit, got: {}", e),
            )),
            (_, Ok(summary)) => self.verify_committed(step, summary),
            (_, Err(e)) => self.verify_aborted(step, e),
        }
    }

    fn verify_committed(&self, step: &str, summary: &CommitSummary) -> ScenarioResult<()> {
        if let Some(expected) = self.derived {
            let actual = summary.changes.derived().count();
            if actual != expected {
                return Err(ScenarioError::assertion_failed(
                    step,
                    format!("expected {} derived changes, got {}", expected, actual),
                ));
            }
        }

        if let Some(ref expected) = self.warnings {
            let actual: Vec<_> = summary
                .warnings
                .warnings()
                .map(|v| v.constraint_name.clone())
                .collect();
            if &actual != expected {
                return Err(ScenarioError::assertion_failed(
                    step,
                    format!(
                        "warning mismatch:\n  expected: {:?}\n  actual:   {:?}",
                        expected, actual
                    ),
                ));
            }
        }

        Ok(())
    }

    fn verify_aborted(&self, step: &str, error: &rulebank_transaction::TransactionError) -> ScenarioResult<()> {
        let text = error.to_string();

        if let Some(ref fragment) = self.error {
            if !text.contains(fragment.as_str()) {
                return Err(ScenarioError::assertion_failed(
                    step,
                    format!("expected error containing '{}', got: {}", fragment, text),
                ));
            }
        }

        if let Some(ref pattern) = self.error_pattern {
            let re = regex_lite::Regex::new(pattern).map_err(|e| {
                ScenarioError::assertion_failed(step, format!("invalid regex pattern: {}", e))
            })?;
            if !re.is_match(&text) {
                return Err(ScenarioError::assertion_failed(
                    step,
                    format!("expected error matching '{}', got: {}", pattern, text),
                ));
            }
        }

        if self.violations.is_none() && self.messages.is_empty() {
            return Ok(());
        }

        let violations = error.violations().ok_or_else(|| {
            ScenarioError::assertion_failed(
                step,
                format!("expected constraint violations, got: {}", text),
            )
        })?;

        if let Some(ref expected) = self.violations {
            let actual: Vec<_> = violations
                .errors()
                .map(|v| v.constraint_name.clone())
                .collect();
            if &actual != expected {
                return Err(ScenarioError::assertion_failed(
                    step,
                    format!(
                        "violation mismatch:\n  expected: {:?}\n  actual:   {:?}",
                        expected, actual
                    ),
                ));
            }
        }

        for message in &self.messages {
            if !violations.all().iter().any(|v| &v.message == message) {
                return Err(ScenarioError::assertion_failed(
                    step,
                    format!("no violation with message '{}' in: {}", message, violations),
                ));
            }
        }

        Ok(())
    }
}

/// Verify `outcome` against the assertion built by `f`.
pub fn expect(
    step: &str,
    outcome: &CommitOutcome,
    f: impl FnOnce(Assertion) -> Assertion,
) -> ScenarioResult<()> {
    f(Assertion::new()).verify(step, outcome)
}
