//! Turns buffered writes into the initial change set.

use rulebank_core::{
    AttrRef, ChangeRecord, ChangeSet, EntityKey, Operation, Origin, Row, RowSource, StoreError,
    TypeId, Value,
};
use rulebank_registry::RuleSet;
use rulebank_rule::WorkingSet;
use tracing::trace;

use crate::buffer::ChangeBuffer;
use crate::error::TransactionResult;

/// Builds the working set and the application change records of a unit of
/// work.
pub struct ChangeCollector<'r> {
    rules: &'r RuleSet,
}

impl<'r> ChangeCollector<'r> {
    pub fn new(rules: &'r RuleSet) -> Self {
        Self { rules }
    }

    /// Collect the buffered writes over the committed state in `source`.
    ///
    /// Inserts record every written attribute. Updates record only values
    /// that differ from the committed ones. Deletes record every stored
    /// attribute that is not derived, transitioning to absent.
    pub fn collect<'s>(
        &self,
        buffer: &ChangeBuffer,
        source: &'s dyn RowSource,
    ) -> TransactionResult<(WorkingSet<'s>, ChangeSet)> {
        let mut ws = WorkingSet::new(source);
        let mut changes = ChangeSet::new();

        for pending in buffer.inserts() {
            let row = pending.to_row();
            for (attr, name) in self.declared(row.type_id, |name| row.get_attr(name).is_some()) {
                changes.push(application(
                    row.key,
                    attr,
                    name,
                    None,
                    row.get_attr(name).cloned(),
                    Operation::Insert,
                ));
            }
            ws.put_row(row);
        }

        for pending in buffer.updates() {
            let prior = source
                .row(pending.key)
                .ok_or(StoreError::RowNotFound(pending.key))?;
            let mut row = prior.clone();
            for (name, value) in &pending.attrs {
                row.set_attr(name.clone(), value.clone());
            }
            for (attr, name) in self.declared(row.type_id, |name| {
                pending.attrs.contains_key(name) && row.value(name) != prior.value(name)
            }) {
                changes.push(application(
                    row.key,
                    attr,
                    name,
                    prior.get_attr(name).cloned(),
                    row.get_attr(name).cloned(),
                    Operation::Update,
                ));
            }
            ws.put_row(row);
        }

        for key in buffer.deletes() {
            let prior = source.row(key).ok_or(StoreError::RowNotFound(key))?;
            for (attr, name) in self.declared(prior.type_id, |name| prior.get_attr(name).is_some()) {
                if self.rules.is_derived(attr) {
                    continue;
                }
                changes.push(application(
                    key,
                    attr,
                    name,
                    prior.get_attr(name).cloned(),
                    None,
                    Operation::Delete,
                ));
            }
            ws.delete_row(key);
        }

        trace!(target: "rulebank::engine", rows = ws.touched_len(), records = changes.len(), "changes collected");
        Ok((ws, changes))
    }

    /// Declared attributes of a type accepted by `keep`, in declaration order.
    fn declared(&self, type_id: TypeId, keep: impl Fn(&str) -> bool) -> Vec<(AttrRef, &'r str)> {
        self.rules
            .attrs_of(type_id)
            .filter(|info| keep(&info.name))
            .map(|info| (info.attr_ref(), info.name.as_str()))
            .collect()
    }
}

fn application(
    key: EntityKey,
    attr: AttrRef,
    name: &str,
    old: Option<Value>,
    new: Option<Value>,
    op: Operation,
) -> ChangeRecord {
    ChangeRecord {
        key,
        attr,
        attr_name: name.to_string(),
        old,
        new,
        op,
        origin: Origin::Application,
    }
}

/// Current state of a row as the unit of work sees it.
pub(crate) fn visible_row(buffer: &ChangeBuffer, source: &dyn RowSource, key: EntityKey) -> Option<Row> {
    if buffer.is_deleted(key) {
        return None;
    }
    if let Some(pending) = buffer.inserted(key) {
        return Some(pending.to_row());
    }
    let mut row = source.row(key)?.clone();
    if let Some(pending) = buffer.updated(key) {
        for (name, value) in &pending.attrs {
            row.set_attr(name.clone(), value.clone());
        }
    }
    Some(row)
}
