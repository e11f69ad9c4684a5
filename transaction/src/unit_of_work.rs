//! Unit of work: buffered writes finalized through the commit gate.

use std::sync::Arc;

use rulebank_core::{Attributes, EntityKey, Persistence, Row, StoreError, TypeId};
use rulebank_registry::RuleSet;
use tracing::debug;

use crate::bank::{CompiledRules, LogicBank};
use crate::buffer::ChangeBuffer;
use crate::collector::visible_row;
use crate::error::{TransactionError, TransactionResult};
use crate::gate::{transition, CommitGate, CommitSummary};

/// Lifecycle of a unit of work. No state is revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfWorkState {
    /// Accepting writes.
    Open,
    /// Turning buffered writes into change records.
    Collecting,
    /// Recomputing derived attributes.
    Evaluating,
    /// Checking constraints on the settled rows.
    Checking,
    /// Persisted.
    Committed,
    /// Rolled back or rejected; nothing was persisted.
    Aborted,
}

impl UnitOfWorkState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

/// Writes against one store, persisted together with every derived change
/// they imply, or not at all.
///
/// Writes are validated and committed against the rules active at `begin`.
pub struct UnitOfWork<'b, P: Persistence> {
    bank: &'b LogicBank,
    compiled: Arc<CompiledRules>,
    store: &'b mut P,
    buffer: ChangeBuffer,
    state: UnitOfWorkState,
}

impl<'b, P: Persistence> UnitOfWork<'b, P> {
    pub(crate) fn new(bank: &'b LogicBank, compiled: Arc<CompiledRules>, store: &'b mut P) -> Self {
        Self {
            bank,
            compiled,
            store,
            buffer: ChangeBuffer::new(),
            state: UnitOfWorkState::Open,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> UnitOfWorkState {
        self.state
    }

    /// Create a row and return its key.
    pub fn insert(&mut self, type_name: &str, attrs: Attributes) -> TransactionResult<EntityKey> {
        self.ensure_open()?;
        let rules = &self.compiled.rules;
        let type_id = rules
            .type_id(type_name)
            .ok_or_else(|| TransactionError::UnknownType(type_name.to_string()))?;
        validate_writes(rules, type_id, &attrs)?;

        let key = self.store.allocate_key();
        self.buffer.insert(key, type_id, attrs);
        debug!(target: "rulebank::engine", key = %key, type_name, "insert buffered");
        Ok(key)
    }

    /// Write attributes of an existing row.
    pub fn update(&mut self, key: EntityKey, attrs: Attributes) -> TransactionResult<()> {
        self.ensure_open()?;
        let type_id = self.visible_type(key)?;
        validate_writes(&self.compiled.rules, type_id, &attrs)?;

        self.buffer.update(key, type_id, attrs);
        debug!(target: "rulebank::engine", key = %key, "update buffered");
        Ok(())
    }

    /// Delete a row.
    pub fn delete(&mut self, key: EntityKey) -> TransactionResult<()> {
        self.ensure_open()?;
        let type_id = self.visible_type(key)?;

        self.buffer.delete(key, type_id);
        debug!(target: "rulebank::engine", key = %key, "delete buffered");
        Ok(())
    }

    /// Current state of a row including this unit of work's writes.
    ///
    /// Derived attributes reflect the committed state until commit.
    pub fn get(&self, key: EntityKey) -> Option<Row> {
        visible_row(&self.buffer, &*self.store, key)
    }

    /// Settle, check and persist every buffered write.
    ///
    /// Any error aborts the unit of work and leaves the store untouched.
    pub fn commit(&mut self) -> TransactionResult<CommitSummary> {
        self.ensure_open()?;

        let result = {
            // Held across the run so a redeclaration waits for this commit
            let active = self.bank.read();
            if Arc::ptr_eq(&active, &self.compiled) {
                let gate = CommitGate::new(&self.compiled.rules, &self.compiled.graph, self.bank.config());
                gate.commit(&mut *self.store, &self.buffer, &mut self.state)
            } else {
                Err(TransactionError::RulesRedeclared)
            }
        };

        self.buffer.clear();
        match result {
            Ok(summary) => {
                transition(&mut self.state, UnitOfWorkState::Committed);
                Ok(summary)
            }
            Err(e) => {
                debug!(target: "rulebank::engine", error = %e, "unit of work aborted");
                transition(&mut self.state, UnitOfWorkState::Aborted);
                Err(e)
            }
        }
    }

    /// Discard every buffered write.
    pub fn rollback(&mut self) -> TransactionResult<()> {
        self.ensure_open()?;
        self.buffer.clear();
        transition(&mut self.state, UnitOfWorkState::Aborted);
        Ok(())
    }

    fn ensure_open(&self) -> TransactionResult<()> {
        match self.state {
            UnitOfWorkState::Open => Ok(()),
            other => Err(TransactionError::Finalized(other)),
        }
    }

    fn visible_type(&self, key: EntityKey) -> TransactionResult<TypeId> {
        self.get(key)
            .map(|row| row.type_id)
            .ok_or_else(|| StoreError::RowNotFound(key).into())
    }
}

/// Application writes must name declared, non-derived attributes with
/// values of the declared kind.
fn validate_writes(rules: &RuleSet, type_id: TypeId, attrs: &Attributes) -> TransactionResult<()> {
    let type_name = rules.type_name(type_id);
    for (name, value) in attrs {
        let info = rules
            .attr_by_name(type_id, name)
            .ok_or_else(|| TransactionError::unknown_attribute(type_name, name))?;
        if rules.is_derived(info.attr_ref()) {
            return Err(TransactionError::derived_attribute_write(type_name, name));
        }
        if !value.conforms_to(info.kind) {
            return Err(TransactionError::kind_mismatch(
                type_name,
                name,
                info.kind,
                value.type_name(),
            ));
        }
    }
    Ok(())
}
