//! Rulebank Rule Declaration Store
//!
//! Holds everything the application declares before activation:
//! entity types and their attributes, one-to-many relationships,
//! derivation rules (sum, count, formula) and constraint rules.
//!
//! Declarations are validated as they are made; `RuleSetBuilder::build`
//! returns an immutable `RuleSet` that is passed by handle to the engine.

mod builder;
mod error;
mod rule_set;
mod types;

pub use builder::*;
pub use error::*;
pub use rule_set::*;
pub use types::*;
