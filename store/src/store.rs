//! In-memory row storage.

use std::collections::HashMap;

use rulebank_core::{
    EntityKey, Persistence, Row, RowSource, RowWrite, StoreError, StoreResult, TypeId,
};
use tracing::trace;

use crate::index::{ReferenceIndex, TypeIndex};

/// Key allocator for rows.
#[derive(Debug)]
struct KeyAllocator {
    next_key: u64,
}

impl KeyAllocator {
    fn new() -> Self {
        Self { next_key: 1 }
    }

    fn alloc(&mut self) -> EntityKey {
        let key = EntityKey::new(self.next_key);
        self.next_key += 1;
        key
    }

    fn is_allocated(&self, key: EntityKey) -> bool {
        key.raw() > 0 && key.raw() < self.next_key
    }
}

/// The in-memory persistence collaborator.
#[derive(Debug)]
pub struct MemStore {
    /// Row storage
    rows: HashMap<EntityKey, Row>,
    /// Key allocator
    key_alloc: KeyAllocator,
    /// Type index
    type_index: TypeIndex,
    /// Reference (foreign key) index
    ref_index: ReferenceIndex,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            rows: HashMap::new(),
            key_alloc: KeyAllocator::new(),
            type_index: TypeIndex::new(),
            ref_index: ReferenceIndex::new(),
        }
    }

    /// Get a row by key.
    pub fn get(&self, key: EntityKey) -> Option<&Row> {
        self.rows.get(&key)
    }

    /// Rows of a type, in key order.
    pub fn rows_of_type(&self, type_id: TypeId) -> Vec<&Row> {
        self.type_index
            .get(type_id)
            .filter_map(|key| self.rows.get(&key))
            .collect()
    }

    /// Get the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Check every write against the state the batch would see, without
    /// mutating anything.
    fn validate(&self, writes: &[RowWrite]) -> StoreResult<()> {
        // Type of each key as the batch progresses; None once deleted.
        let mut pending: HashMap<EntityKey, Option<TypeId>> = HashMap::new();

        for write in writes {
            let key = write.key();
            let current = match pending.get(&key) {
                Some(state) => *state,
                None => self.rows.get(&key).map(|r| r.type_id),
            };

            match write {
                RowWrite::Upsert(row) => {
                    if !self.key_alloc.is_allocated(key) {
                        return Err(StoreError::InvalidWrite(format!(
                            "key {key} was not allocated by this store"
                        )));
                    }
                    if let Some(stored) = current {
                        if stored != row.type_id {
                            return Err(StoreError::TypeChanged {
                                key,
                                stored,
                                written: row.type_id,
                            });
                        }
                    }
                    pending.insert(key, Some(row.type_id));
                }
                RowWrite::Delete(_) => {
                    if current.is_none() {
                        return Err(StoreError::RowNotFound(key));
                    }
                    pending.insert(key, None);
                }
            }
        }
        Ok(())
    }

    fn upsert(&mut self, row: Row) {
        if let Some(old) = self.rows.remove(&row.key) {
            self.ref_index.remove_row(&old);
            self.type_index.remove(old.type_id, old.key);
        }
        self.type_index.insert(row.type_id, row.key);
        self.ref_index.insert_row(&row);
        self.rows.insert(row.key, row);
    }

    fn remove(&mut self, key: EntityKey) {
        if let Some(old) = self.rows.remove(&key) {
            self.ref_index.remove_row(&old);
            self.type_index.remove(old.type_id, old.key);
        }
    }
}

impl RowSource for MemStore {
    fn row(&self, key: EntityKey) -> Option<&Row> {
        self.rows.get(&key)
    }

    fn children_of(&self, child_type: TypeId, fk_attr: &str, parent: EntityKey) -> Vec<EntityKey> {
        self.ref_index
            .referencing(child_type, fk_attr, parent)
            .collect()
    }
}

impl Persistence for MemStore {
    fn allocate_key(&mut self) -> EntityKey {
        self.key_alloc.alloc()
    }

    fn apply(&mut self, writes: &[RowWrite]) -> StoreResult<()> {
        self.validate(writes)?;

        for write in writes {
            match write {
                RowWrite::Upsert(row) => self.upsert(row.clone()),
                RowWrite::Delete(key) => self.remove(*key),
            }
        }

        trace!(target: "rulebank::engine", writes = writes.len(), rows = self.rows.len(), "batch applied");
        Ok(())
    }
}
