//! Engine configuration.

use tracing::warn;

use crate::MAX_TASKS;

/// Environment variable overriding `max_tasks`.
pub const MAX_TASKS_ENV: &str = "RULEBANK_MAX_TASKS";

/// Tunables of the incremental evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum rule evaluations per unit of work.
    pub max_tasks: usize,
    /// Include old and new values in rule firing logs.
    pub log_rule_values: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tasks: MAX_TASKS,
            log_rule_values: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    pub fn with_log_rule_values(mut self, enabled: bool) -> Self {
        self.log_rule_values = enabled;
        self
    }

    /// Defaults, with `max_tasks` taken from `RULEBANK_MAX_TASKS` when set.
    pub fn from_env() -> Self {
        let config = Self::default();
        match std::env::var(MAX_TASKS_ENV) {
            Ok(raw) => match raw.trim().parse::<usize>() {
                Ok(max_tasks) if max_tasks > 0 => config.with_max_tasks(max_tasks),
                _ => {
                    warn!(target: "rulebank::engine", value = %raw, "ignoring invalid {}", MAX_TASKS_ENV);
                    config
                }
            },
            Err(_) => config,
        }
    }
}
