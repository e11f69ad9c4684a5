//! Rulebank Row Storage
//!
//! In-memory implementation of the persistence collaborator:
//! - Row storage keyed by stable entity keys
//! - Type index: find rows by type
//! - Reference index: find the children referencing a parent
//! - All-or-nothing batch writes

mod index;
mod store;

pub use store::*;
