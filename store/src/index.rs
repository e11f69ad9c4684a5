//! Indexes for efficient row lookups.

use std::collections::{BTreeSet, HashMap};

use rulebank_core::{EntityKey, Row, TypeId, Value};

/// Type index: TypeId -> Set<EntityKey>
#[derive(Debug, Default)]
pub struct TypeIndex {
    index: HashMap<TypeId, BTreeSet<EntityKey>>,
}

impl TypeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, type_id: TypeId, key: EntityKey) {
        self.index.entry(type_id).or_default().insert(key);
    }

    pub fn remove(&mut self, type_id: TypeId, key: EntityKey) {
        if let Some(set) = self.index.get_mut(&type_id) {
            set.remove(&key);
            if set.is_empty() {
                self.index.remove(&type_id);
            }
        }
    }

    pub fn get(&self, type_id: TypeId) -> impl Iterator<Item = EntityKey> + '_ {
        self.index
            .get(&type_id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }
}

/// Key for the reference index: (child type, attribute name, referenced key)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RefKey {
    type_id: TypeId,
    attr_name: String,
    target: EntityKey,
}

/// Reference index: (TypeId, attr_name, referenced key) -> Set<EntityKey>
///
/// Every `Value::Ref` attribute is indexed, so any foreign key can be
/// traversed from the parent side.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    index: HashMap<RefKey, BTreeSet<EntityKey>>,
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every reference held by `row`.
    pub fn insert_row(&mut self, row: &Row) {
        for (attr_name, value) in &row.attributes {
            if let Value::Ref(target) = value {
                let key = RefKey {
                    type_id: row.type_id,
                    attr_name: attr_name.clone(),
                    target: *target,
                };
                self.index.entry(key).or_default().insert(row.key);
            }
        }
    }

    /// Drop every reference held by `row`.
    pub fn remove_row(&mut self, row: &Row) {
        for (attr_name, value) in &row.attributes {
            if let Value::Ref(target) = value {
                let key = RefKey {
                    type_id: row.type_id,
                    attr_name: attr_name.clone(),
                    target: *target,
                };
                if let Some(set) = self.index.get_mut(&key) {
                    set.remove(&row.key);
                    if set.is_empty() {
                        self.index.remove(&key);
                    }
                }
            }
        }
    }

    /// Rows of `type_id` whose `attr_name` references `target`, in key order.
    pub fn referencing(
        &self,
        type_id: TypeId,
        attr_name: &str,
        target: EntityKey,
    ) -> impl Iterator<Item = EntityKey> + '_ {
        let key = RefKey {
            type_id,
            attr_name: attr_name.to_string(),
            target,
        };
        self.index
            .get(&key)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }
}
