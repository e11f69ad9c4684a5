//! Rulebank Constraint
//!
//! Validate settled rows against declared constraints.
//!
//! Responsibilities:
//! - Check every constraint of each touched row's type
//! - Distinguish hard (abort) vs soft (warn) constraints
//! - Render violation messages from templates

mod checker;
mod template;
mod violation;

pub use checker::ConstraintChecker;
pub use rulebank_registry::RowState;
pub use template::render;
pub use violation::{Violation, Violations};
