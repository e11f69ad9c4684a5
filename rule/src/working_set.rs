//! Pending state of a unit of work layered over committed rows.

use std::collections::{BTreeMap, BTreeSet};

use rulebank_core::{EntityKey, Row, RowSource, RowWrite, TypeId, Value};

/// Overlay of one unit of work on the committed rows.
///
/// Rows that were never touched read through to the source. Touched rows
/// hold their current state, or None once deleted. The committed state of
/// every row stays available as its prior.
pub struct WorkingSet<'s> {
    source: &'s dyn RowSource,
    overlay: BTreeMap<EntityKey, Option<Row>>,
}

impl<'s> WorkingSet<'s> {
    /// Create an empty overlay on `source`.
    pub fn new(source: &'s dyn RowSource) -> Self {
        Self {
            source,
            overlay: BTreeMap::new(),
        }
    }

    /// Current state of a row. None if absent or deleted.
    pub fn row(&self, key: EntityKey) -> Option<&Row> {
        match self.overlay.get(&key) {
            Some(state) => state.as_ref(),
            None => self.source.row(key),
        }
    }

    /// Committed state of a row. None for rows inserted by this unit of work.
    pub fn prior(&self, key: EntityKey) -> Option<&'s Row> {
        self.source.row(key)
    }

    /// Returns true if the row was deleted by this unit of work.
    pub fn is_deleted(&self, key: EntityKey) -> bool {
        matches!(self.overlay.get(&key), Some(None))
    }

    /// Returns true if the row was created by this unit of work.
    pub fn is_inserted(&self, key: EntityKey) -> bool {
        matches!(self.overlay.get(&key), Some(Some(_))) && self.source.row(key).is_none()
    }

    /// Put the full current state of a row.
    pub fn put_row(&mut self, row: Row) {
        self.overlay.insert(row.key, Some(row));
    }

    /// Mark a row deleted.
    pub fn delete_row(&mut self, key: EntityKey) {
        self.overlay.insert(key, None);
    }

    /// Set one attribute of a present row, returning the previous value.
    ///
    /// Returns None without writing if the row is absent or deleted.
    pub fn set_attr(&mut self, key: EntityKey, name: &str, value: Value) -> Option<Option<Value>> {
        if !self.overlay.contains_key(&key) {
            let committed = self.source.row(key)?.clone();
            self.overlay.insert(key, Some(committed));
        }
        let row = self.overlay.get_mut(&key)?.as_mut()?;
        Some(row.set_attr(name, value))
    }

    /// Current children of `parent`: committed children that still reference
    /// it, plus touched rows that now do. In key order.
    pub fn children_of(&self, child_type: TypeId, fk_attr: &str, parent: EntityKey) -> Vec<EntityKey> {
        let mut children: BTreeSet<EntityKey> = self
            .source
            .children_of(child_type, fk_attr, parent)
            .into_iter()
            .filter(|key| !self.overlay.contains_key(key))
            .collect();

        for (key, state) in &self.overlay {
            if let Some(row) = state {
                if row.type_id == child_type && row.reference(fk_attr) == Some(parent) {
                    children.insert(*key);
                }
            }
        }

        children.into_iter().collect()
    }

    /// Keys of every touched row, in key order.
    pub fn touched_keys(&self) -> impl Iterator<Item = EntityKey> + '_ {
        self.overlay.keys().copied()
    }

    /// Number of touched rows.
    pub fn touched_len(&self) -> usize {
        self.overlay.len()
    }

    /// The writes that bring the committed state to the current state.
    ///
    /// Rows whose current state equals their committed state produce no write.
    pub fn writes(&self) -> Vec<RowWrite> {
        self.overlay
            .iter()
            .filter_map(|(key, state)| {
                let prior = self.source.row(*key);
                match (state, prior) {
                    (Some(row), Some(prior)) if row == prior => None,
                    (Some(row), _) => Some(RowWrite::Upsert(row.clone())),
                    (None, Some(_)) => Some(RowWrite::Delete(*key)),
                    (None, None) => None,
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for WorkingSet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingSet")
            .field("overlay", &self.overlay)
            .finish_non_exhaustive()
    }
}
