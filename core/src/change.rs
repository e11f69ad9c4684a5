//! Change records captured while a unit of work is finalized.

use std::collections::BTreeSet;

use crate::{AttrRef, EntityKey, RuleId, Value};

/// The kind of write that produced a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

/// Who produced a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Written by application code.
    Application,
    /// Computed by a derivation rule.
    Derived(RuleId),
}

/// One attribute transition of one entity.
///
/// `old` is None when the attribute did not exist before (insert), `new` is
/// None when it no longer exists (delete).
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub key: EntityKey,
    pub attr: AttrRef,
    pub attr_name: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
    pub op: Operation,
    pub origin: Origin,
}

impl ChangeRecord {
    /// Returns true if this change was computed by a rule.
    pub fn is_derived(&self) -> bool {
        matches!(self.origin, Origin::Derived(_))
    }

    /// Old value, absent reads as Null.
    pub fn old_value(&self) -> &Value {
        self.old.as_ref().unwrap_or(&Value::Null)
    }

    /// New value, absent reads as Null.
    pub fn new_value(&self) -> &Value {
        self.new.as_ref().unwrap_or(&Value::Null)
    }
}

/// Ordered collection of change records for one unit of work.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    records: Vec<ChangeRecord>,
}

impl ChangeSet {
    /// Create a new empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record.
    pub fn push(&mut self, record: ChangeRecord) {
        self.records.push(record);
    }

    /// Append all records of another change set.
    pub fn extend(&mut self, other: ChangeSet) {
        self.records.extend(other.records);
    }

    /// Check if there are any records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Get the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Get all records in capture order.
    pub fn all(&self) -> &[ChangeRecord] {
        &self.records
    }

    /// Iterate over records.
    pub fn iter(&self) -> std::slice::Iter<'_, ChangeRecord> {
        self.records.iter()
    }

    /// Records written by application code.
    pub fn application(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.records.iter().filter(|r| !r.is_derived())
    }

    /// Records computed by derivation rules.
    pub fn derived(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.records.iter().filter(|r| r.is_derived())
    }

    /// Records of one entity.
    pub fn for_entity(&self, key: EntityKey) -> impl Iterator<Item = &ChangeRecord> {
        self.records.iter().filter(move |r| r.key == key)
    }

    /// The last record for an entity attribute, by name.
    pub fn find(&self, key: EntityKey, attr_name: &str) -> Option<&ChangeRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| r.key == key && r.attr_name == attr_name)
    }

    /// Every entity with at least one record, in key order.
    pub fn touched_keys(&self) -> BTreeSet<EntityKey> {
        self.records.iter().map(|r| r.key).collect()
    }
}

impl IntoIterator for ChangeSet {
    type Item = ChangeRecord;
    type IntoIter = std::vec::IntoIter<ChangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a ChangeRecord;
    type IntoIter = std::slice::Iter<'a, ChangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
