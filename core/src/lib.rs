//! Rulebank Core Types
//!
//! This crate provides the foundational types shared by every rulebank crate:
//! - Identity types (EntityKey, TypeId, AttrId, AttrRef)
//! - Value types (the Value enum and declared ValueKind)
//! - Rows (the persisted entity as the engine sees it)
//! - Change records produced while a unit of work is finalized
//! - The read side of the persistence collaborator (RowSource)

mod change;
mod error;
mod id;
mod row;
mod source;
mod value;

pub use change::*;
pub use error::*;
pub use id::*;
pub use row::*;
pub use source::*;
pub use value::*;
