//! Dependency graph compiled from a RuleSet.

use std::collections::{BTreeSet, HashMap, VecDeque};

use rulebank_core::{AttrRef, RuleId};
use rulebank_registry::{ConfigResult, ConfigurationError, DerivationKind, RuleSet};
use tracing::debug;

use crate::index::{AdjacencyIndex, DependencyRole, Dependent, ProducerIndex};

/// Immutable DAG of attribute dependencies.
///
/// An edge from X to Y means a change to X may require recomputing Y.
/// Nodes are stable attribute references; nothing is looked up by name
/// once the graph is built.
#[derive(Debug)]
pub struct DependencyGraph {
    adjacency: AdjacencyIndex,
    producers: ProducerIndex,
    /// Longest distance from a stored attribute.
    rank: HashMap<AttrRef, usize>,
    /// Derived attributes in evaluation order.
    order: Vec<AttrRef>,
}

impl DependencyGraph {
    /// Compile the dependency graph of a rule set.
    ///
    /// Fails if two rules produce the same attribute or the dependencies
    /// form a cycle. The result only depends on declaration order.
    pub fn build(rules: &RuleSet) -> ConfigResult<Self> {
        let mut adjacency = AdjacencyIndex::new();
        let mut producers = ProducerIndex::new();

        for def in rules.derivations() {
            if let Err(existing) = producers.insert(def.target.attr, def.id) {
                let existing = rules
                    .derivation(existing)
                    .map_or("?", |d| d.rule.label());
                return Err(ConfigurationError::ConflictingDerivation {
                    target: def.name.clone(),
                    existing: existing.to_string(),
                    declared: def.rule.label().to_string(),
                });
            }

            let dependent = |role| Dependent {
                rule: def.id,
                target: def.target.attr,
                role,
            };

            match &def.rule {
                DerivationKind::Sum(agg) | DerivationKind::Count(agg) => {
                    for attr in agg.child_attrs() {
                        adjacency.insert(attr.attr, dependent(DependencyRole::AggregateChild));
                    }
                }
                DerivationKind::Formula(formula) => {
                    for attr in &formula.own {
                        adjacency.insert(attr.attr, dependent(DependencyRole::FormulaOwn));
                    }
                    for parent in &formula.parents {
                        adjacency.insert(parent.fk.attr, dependent(DependencyRole::FormulaOwn));
                        adjacency.insert(
                            parent.attr.attr,
                            dependent(DependencyRole::FormulaChildrenOf(parent.relationship)),
                        );
                    }
                }
            }
        }

        let rank = Self::rank_nodes(rules, &adjacency)?;

        let mut order: Vec<AttrRef> = rules.derivations().iter().map(|d| d.target.attr).collect();
        order.sort_by_key(|attr| {
            let decl = producers
                .get(*attr)
                .and_then(|id| rules.declaration_index(id))
                .unwrap_or(usize::MAX);
            (rank.get(attr).copied().unwrap_or(0), decl)
        });

        debug!(
            target: "rulebank::engine",
            derived = producers.len(),
            edges = adjacency.edge_count(),
            "dependency graph compiled"
        );

        Ok(Self {
            adjacency,
            producers,
            rank,
            order,
        })
    }

    /// Kahn's algorithm. Ranks every node by its longest distance from a
    /// source node and reports the first cycle left over.
    fn rank_nodes(
        rules: &RuleSet,
        adjacency: &AdjacencyIndex,
    ) -> ConfigResult<HashMap<AttrRef, usize>> {
        let nodes: BTreeSet<AttrRef> = adjacency.nodes().collect();
        let mut in_degree: HashMap<AttrRef, usize> = nodes
            .iter()
            .map(|n| (*n, adjacency.sources(*n).len()))
            .collect();
        let mut rank: HashMap<AttrRef, usize> = nodes.iter().map(|n| (*n, 0)).collect();

        let mut ready: VecDeque<AttrRef> = nodes
            .iter()
            .filter(|n| in_degree[*n] == 0)
            .copied()
            .collect();
        let mut visited = 0;

        while let Some(node) = ready.pop_front() {
            visited += 1;
            let next_rank = rank[&node] + 1;
            for target in adjacency.targets(node) {
                if let Some(r) = rank.get_mut(&target) {
                    *r = (*r).max(next_rank);
                }
                if let Some(degree) = in_degree.get_mut(&target) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(target);
                    }
                }
            }
        }

        if visited < nodes.len() {
            let remaining: BTreeSet<AttrRef> = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(n, _)| *n)
                .collect();
            return Err(Self::cycle_error(rules, adjacency, &remaining));
        }

        Ok(rank)
    }

    /// Walk the nodes left over by Kahn's algorithm until one repeats.
    fn cycle_error(
        rules: &RuleSet,
        adjacency: &AdjacencyIndex,
        remaining: &BTreeSet<AttrRef>,
    ) -> ConfigurationError {
        // Every remaining node has a remaining predecessor, so walking
        // backwards through sources always finds a repeat.
        let start = rules
            .derivations()
            .iter()
            .map(|d| d.target.attr)
            .find(|a| remaining.contains(a))
            .or_else(|| remaining.iter().next().copied());

        let mut path: Vec<AttrRef> = Vec::new();
        let mut current = start;
        while let Some(node) = current {
            if let Some(pos) = path.iter().position(|n| *n == node) {
                let mut cycle: Vec<String> = path[pos..]
                    .iter()
                    .rev()
                    .map(|a| rules.qualified_name(*a))
                    .collect();
                cycle.push(cycle[0].clone());
                return ConfigurationError::cycle(cycle);
            }
            path.push(node);
            current = adjacency
                .sources(node)
                .iter()
                .find(|s| remaining.contains(s))
                .copied();
        }

        ConfigurationError::cycle(path.iter().map(|a| rules.qualified_name(*a)).collect())
    }

    /// Rules reading `attr`.
    pub fn dependents(&self, attr: AttrRef) -> &[Dependent] {
        self.adjacency.dependents(attr)
    }

    /// The rule producing a derived attribute.
    pub fn producer(&self, attr: AttrRef) -> Option<RuleId> {
        self.producers.get(attr)
    }

    /// Attributes a derived attribute is computed from.
    pub fn sources(&self, attr: AttrRef) -> &[AttrRef] {
        self.adjacency.sources(attr)
    }

    /// Longest distance from a stored attribute; 0 for stored attributes.
    pub fn rank(&self, attr: AttrRef) -> usize {
        self.rank.get(&attr).copied().unwrap_or(0)
    }

    pub fn is_derived(&self, attr: AttrRef) -> bool {
        self.producers.get(attr).is_some()
    }

    /// Derived attributes ordered by rank, ties by declaration order.
    pub fn topological_order(&self) -> &[AttrRef] {
        &self.order
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.edge_count()
    }
}
