//! The persistence collaborator, as the engine sees it.

use crate::{EntityKey, Row, StoreResult, TypeId};

/// Read side of the persistence collaborator.
///
/// Implementations expose the committed state only. Pending writes of the
/// current unit of work are layered on top by the engine.
pub trait RowSource {
    /// Get a committed row by key.
    fn row(&self, key: EntityKey) -> Option<&Row>;

    /// Keys of committed rows of `child_type` whose `fk_attr` references `parent`.
    fn children_of(&self, child_type: TypeId, fk_attr: &str, parent: EntityKey) -> Vec<EntityKey>;
}

/// A write handed to the persistence layer when a unit of work commits.
#[derive(Debug, Clone, PartialEq)]
pub enum RowWrite {
    /// Insert the row, or replace it if the key exists.
    Upsert(Row),
    /// Remove the row.
    Delete(EntityKey),
}

impl RowWrite {
    pub fn key(&self) -> EntityKey {
        match self {
            RowWrite::Upsert(row) => row.key,
            RowWrite::Delete(key) => *key,
        }
    }
}

/// Write side of the persistence collaborator.
pub trait Persistence: RowSource {
    /// Allocate a key for a row inserted by a unit of work.
    fn allocate_key(&mut self) -> EntityKey;

    /// Apply a batch of writes. Either every write is applied or none is.
    fn apply(&mut self, writes: &[RowWrite]) -> StoreResult<()>;
}
