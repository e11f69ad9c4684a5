//! Indexes for dependency lookups.

use std::collections::HashMap;

use rulebank_core::{AttrRef, RuleId};
use rulebank_registry::RelationshipId;

/// How a changed row maps to the subject of a dependent rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyRole {
    /// The changed row is a child of an aggregate; its parent is the subject.
    AggregateChild,
    /// The changed row is the formula's own row.
    FormulaOwn,
    /// The changed row is a parent; each child through the relationship is a subject.
    FormulaChildrenOf(RelationshipId),
}

/// A rule that must be re-evaluated when its source attribute changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependent {
    pub rule: RuleId,
    pub target: AttrRef,
    pub role: DependencyRole,
}

/// Adjacency index: source -> dependents, target -> sources.
#[derive(Debug, Default)]
pub struct AdjacencyIndex {
    /// Rules reading each attribute, in declaration order.
    outbound: HashMap<AttrRef, Vec<Dependent>>,
    /// Distinct source attributes of each derived attribute.
    inbound: HashMap<AttrRef, Vec<AttrRef>>,
    /// Number of distinct (source, target) edges.
    edge_count: usize,
}

impl AdjacencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: AttrRef, dependent: Dependent) {
        let out = self.outbound.entry(source).or_default();
        if !out.contains(&dependent) {
            out.push(dependent);
        }

        let sources = self.inbound.entry(dependent.target).or_default();
        if !sources.contains(&source) {
            sources.push(source);
            self.edge_count += 1;
        }
    }

    /// Rules reading `source`.
    pub fn dependents(&self, source: AttrRef) -> &[Dependent] {
        self.outbound.get(&source).map_or(&[], Vec::as_slice)
    }

    /// Attributes `target` is computed from.
    pub fn sources(&self, target: AttrRef) -> &[AttrRef] {
        self.inbound.get(&target).map_or(&[], Vec::as_slice)
    }

    /// Distinct attributes computed from `source`.
    pub fn targets(&self, source: AttrRef) -> Vec<AttrRef> {
        let mut targets: Vec<AttrRef> = Vec::new();
        for dependent in self.dependents(source) {
            if !targets.contains(&dependent.target) {
                targets.push(dependent.target);
            }
        }
        targets
    }

    /// Every attribute that appears on either end of an edge.
    pub fn nodes(&self) -> impl Iterator<Item = AttrRef> + '_ {
        self.outbound.keys().chain(self.inbound.keys()).copied()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }
}

/// Producer index: derived attribute -> the rule computing it.
#[derive(Debug, Default)]
pub struct ProducerIndex {
    index: HashMap<AttrRef, RuleId>,
}

impl ProducerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `rule` as producer of `target`, returning the existing
    /// producer if another rule already claims it.
    pub fn insert(&mut self, target: AttrRef, rule: RuleId) -> Result<(), RuleId> {
        match self.index.get(&target) {
            Some(&existing) if existing != rule => Err(existing),
            _ => {
                self.index.insert(target, rule);
                Ok(())
            }
        }
    }

    pub fn get(&self, target: AttrRef) -> Option<RuleId> {
        self.index.get(&target).copied()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
