//! Rulebank Transaction
//!
//! Finalize units of work through the rules.
//!
//! Responsibilities:
//! - Buffer inserts, updates and deletes with read-your-writes
//! - Collect them into the initial change set
//! - Orchestrate: collect → evaluate → check → persist or abort
//! - Guard activated rules against redeclaration during a commit

mod bank;
mod buffer;
mod collector;
mod error;
mod gate;
mod unit_of_work;

pub use bank::{CompiledRules, LogicBank};
pub use buffer::{ChangeBuffer, PendingInsert, PendingUpdate};
pub use collector::ChangeCollector;
pub use error::{TransactionError, TransactionResult};
pub use gate::{CommitGate, CommitSummary};
pub use rulebank_core::{Persistence, RowWrite};
pub use unit_of_work::{UnitOfWork, UnitOfWorkState};
