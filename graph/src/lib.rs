//! Rulebank Dependency Graph
//!
//! Compiles a `RuleSet` into an immutable attribute dependency DAG:
//! - Adjacency index: which rules read an attribute, and in which role
//! - Producer index: which rule computes a derived attribute
//! - Ranks: longest distance from a stored attribute, used to order recomputation
//!
//! Built once per activation and shared read-only by every unit of work.

mod graph;
mod index;

pub use graph::*;
pub use index::{DependencyRole, Dependent};
