//! Buffer of the writes a unit of work has made but not committed.

use std::collections::BTreeMap;

use rulebank_core::{Attributes, EntityKey, Row, TypeId};

/// A row created in this unit of work.
#[derive(Debug, Clone)]
pub struct PendingInsert {
    pub key: EntityKey,
    pub type_id: TypeId,
    pub attrs: Attributes,
}

impl PendingInsert {
    pub fn to_row(&self) -> Row {
        Row::new(self.key, self.type_id, self.attrs.clone())
    }
}

/// Attribute writes to a committed row, latest value per attribute.
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    pub key: EntityKey,
    pub type_id: TypeId,
    pub attrs: Attributes,
}

/// Writes of one unit of work, folded per row.
///
/// An update of a row created in the same unit of work folds into the
/// insert; a delete of such a row cancels it.
#[derive(Debug, Clone, Default)]
pub struct ChangeBuffer {
    inserts: BTreeMap<EntityKey, PendingInsert>,
    updates: BTreeMap<EntityKey, PendingUpdate>,
    deletes: BTreeMap<EntityKey, TypeId>,
}

impl ChangeBuffer {
    /// Create a new empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a row creation under an allocated key.
    pub fn insert(&mut self, key: EntityKey, type_id: TypeId, attrs: Attributes) {
        self.inserts.insert(
            key,
            PendingInsert {
                key,
                type_id,
                attrs,
            },
        );
    }

    /// Record attribute writes.
    pub fn update(&mut self, key: EntityKey, type_id: TypeId, attrs: Attributes) {
        if let Some(pending) = self.inserts.get_mut(&key) {
            pending.attrs.extend(attrs);
            return;
        }

        self.updates
            .entry(key)
            .or_insert_with(|| PendingUpdate {
                key,
                type_id,
                attrs: Attributes::new(),
            })
            .attrs
            .extend(attrs);
    }

    /// Record a row deletion.
    pub fn delete(&mut self, key: EntityKey, type_id: TypeId) {
        // Created in this unit of work: nothing reaches the store
        if self.inserts.remove(&key).is_some() {
            return;
        }
        self.updates.remove(&key);
        self.deletes.insert(key, type_id);
    }

    /// Pending insert of a row, if it was created here.
    pub fn inserted(&self, key: EntityKey) -> Option<&PendingInsert> {
        self.inserts.get(&key)
    }

    /// Pending attribute writes to a committed row.
    pub fn updated(&self, key: EntityKey) -> Option<&PendingUpdate> {
        self.updates.get(&key)
    }

    /// Check if a row was deleted here.
    pub fn is_deleted(&self, key: EntityKey) -> bool {
        self.deletes.contains_key(&key)
    }

    /// Inserts in key order.
    pub fn inserts(&self) -> impl Iterator<Item = &PendingInsert> {
        self.inserts.values()
    }

    /// Updates in key order.
    pub fn updates(&self) -> impl Iterator<Item = &PendingUpdate> {
        self.updates.values()
    }

    /// Deleted keys in key order.
    pub fn deletes(&self) -> impl Iterator<Item = EntityKey> + '_ {
        self.deletes.keys().copied()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Number of rows with pending writes.
    pub fn len(&self) -> usize {
        self.inserts.len() + self.updates.len() + self.deletes.len()
    }

    /// Discard every pending write.
    pub fn clear(&mut self) {
        self.inserts.clear();
        self.updates.clear();
        self.deletes.clear();
    }
}
