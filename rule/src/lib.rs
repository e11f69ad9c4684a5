//! Rulebank Rule
//!
//! Incremental evaluation of derivation rules.
//!
//! Responsibilities:
//! - Layer a unit of work's pending rows over committed state
//! - Seed rule tasks from application changes
//! - Adjust sums and counts by deltas, recompute formulas
//! - Settle in rank order and report derived changes
//! - Bound the work done per unit of work

mod config;
mod engine;
mod error;
mod working_set;

pub use config::{EngineConfig, MAX_TASKS_ENV};
pub use engine::{Evaluation, EvaluationStats, Evaluator};
pub use error::{EvalResult, EvaluationError};
pub use working_set::WorkingSet;

/// Default maximum tasks per unit of work.
pub const MAX_TASKS: usize = 100_000;
