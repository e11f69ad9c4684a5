//! Test support errors.

use thiserror::Error;

/// Result type for scenario checks.
pub type ScenarioResult<T> = Result<T, ScenarioError>;

/// Errors raised while running a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("step '{step}' failed: {message}")]
    AssertionFailed { step: String, message: String },

    #[error("setup failed: {0}")]
    Setup(#[from] rulebank_transaction::TransactionError),

    #[error("rules rejected: {0}")]
    Configuration(#[from] rulebank_registry::ConfigurationError),
}

impl ScenarioError {
    pub fn assertion_failed(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AssertionFailed {
            step: step.into(),
            message: message.into(),
        }
    }
}
