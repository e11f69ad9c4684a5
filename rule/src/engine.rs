//! Incremental evaluator.

use std::collections::{BTreeSet, HashMap};

use rulebank_core::{
    AttrRef, ChangeRecord, ChangeSet, EntityKey, Operation, Origin, Row, RuleId, Value,
};
use rulebank_graph::{DependencyGraph, DependencyRole};
use rulebank_registry::{AggregateDef, DerivationDef, DerivationKind, FormulaContext, FormulaDef, RuleSet};
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::error::{EvalResult, EvaluationError};
use crate::working_set::WorkingSet;

/// Statistics from one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationStats {
    /// Tasks taken from the queue.
    pub tasks_run: usize,
    /// Aggregate adjustments applied to parents.
    pub adjustments: usize,
    /// Formulas evaluated.
    pub formulas_evaluated: usize,
    /// Derived attribute changes in the final change set.
    pub derived_changes: usize,
    /// Highest rank processed.
    pub max_rank: usize,
}

/// The settled change set of a unit of work.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Application changes followed by derived changes.
    pub changes: ChangeSet,
    /// Counters gathered while settling.
    pub stats: EvaluationStats,
}

/// A rule to re-evaluate for one row.
///
/// For aggregates the row is a child whose contribution is re-accounted;
/// for formulas it is the row being computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Task {
    rank: usize,
    decl: usize,
    key: EntityKey,
    rule: RuleId,
}

/// What a child currently adds to its parent's aggregate.
#[derive(Debug, Clone, PartialEq)]
struct Contribution {
    parent: EntityKey,
    amount: Value,
}

impl Contribution {
    fn of(agg: &AggregateDef, row: Option<&Row>) -> Option<Self> {
        let row = row?;
        if row.type_id != agg.child_type {
            return None;
        }
        let parent = row.reference(&agg.fk.name)?;
        if let Some(filter) = &agg.filter {
            if !filter.filter.eval(row) {
                return None;
            }
        }
        let amount = match &agg.source {
            Some(source) => row.value(&source.name).clone(),
            None => Value::Int(1),
        };
        Some(Self { parent, amount })
    }
}

/// Net change of one derived attribute.
#[derive(Debug)]
struct DerivedChange {
    key: EntityKey,
    target: AttrRef,
    name: String,
    rule: RuleId,
    original: Option<Value>,
    current: Value,
    op: Operation,
}

/// Recomputes the derived attributes affected by a change set.
///
/// Tasks are processed in rank order, so every adjustment to an attribute
/// lands before any of its dependents reads it.
pub struct Evaluator<'r> {
    rules: &'r RuleSet,
    graph: &'r DependencyGraph,
    config: &'r EngineConfig,
    queue: BTreeSet<Task>,
    /// Contribution of each (rule, child) already reflected in the parent.
    accounted: HashMap<(RuleId, EntityKey), Option<Contribution>>,
    derived: Vec<DerivedChange>,
    derived_index: HashMap<(EntityKey, AttrRef), usize>,
    stats: EvaluationStats,
}

impl<'r> Evaluator<'r> {
    pub fn new(rules: &'r RuleSet, graph: &'r DependencyGraph, config: &'r EngineConfig) -> Self {
        Self {
            rules,
            graph,
            config,
            queue: BTreeSet::new(),
            accounted: HashMap::new(),
            derived: Vec::new(),
            derived_index: HashMap::new(),
            stats: EvaluationStats::default(),
        }
    }

    /// Settle the working set after the application changes in `initial`.
    ///
    /// `ws` must already hold the application changes. On return it holds
    /// every derived value as well.
    pub fn run(mut self, ws: &mut WorkingSet<'_>, initial: ChangeSet) -> EvalResult<Evaluation> {
        debug!(target: "rulebank::engine", records = initial.len(), rows = ws.touched_len(), "evaluation started");

        let inserted: Vec<EntityKey> = ws.touched_keys().filter(|k| ws.is_inserted(*k)).collect();
        for key in inserted {
            self.initialize_inserted(ws, key);
        }

        for record in initial.iter() {
            self.schedule_dependents(ws, record.key, record.attr);
        }

        let rules = self.rules;
        while let Some(task) = self.queue.pop_first() {
            self.stats.tasks_run += 1;
            if self.stats.tasks_run > self.config.max_tasks {
                return Err(EvaluationError::task_limit_exceeded(self.config.max_tasks));
            }
            self.stats.max_rank = self.stats.max_rank.max(task.rank);

            let Some(def) = rules.derivation(task.rule) else {
                continue;
            };
            trace!(target: "rulebank::engine", rule = %def.describe(), key = %task.key, rank = task.rank, "task");
            match &def.rule {
                DerivationKind::Sum(agg) | DerivationKind::Count(agg) => {
                    self.account_child(ws, def, agg, task.key)?
                }
                DerivationKind::Formula(formula) => {
                    self.evaluate_formula(ws, def, formula, task.key)?
                }
            }
        }

        let mut changes = initial;
        for change in self.derived {
            if change.original.as_ref() == Some(&change.current) {
                continue;
            }
            self.stats.derived_changes += 1;
            changes.push(ChangeRecord {
                key: change.key,
                attr: change.target,
                attr_name: change.name,
                old: change.original,
                new: Some(change.current),
                op: change.op,
                origin: Origin::Derived(change.rule),
            });
        }

        debug!(
            target: "rulebank::engine",
            tasks = self.stats.tasks_run,
            adjustments = self.stats.adjustments,
            derived = self.stats.derived_changes,
            "evaluation settled"
        );
        Ok(Evaluation {
            changes,
            stats: self.stats,
        })
    }

    /// Aggregates of a new row start at zero; its formulas are computed.
    fn initialize_inserted(&mut self, ws: &mut WorkingSet<'_>, key: EntityKey) {
        let rules = self.rules;
        let Some(type_id) = ws.row(key).map(|r| r.type_id) else {
            return;
        };

        for def in rules.derivations_for_type(type_id) {
            match &def.rule {
                DerivationKind::Sum(_) | DerivationKind::Count(_) => {
                    let unset = ws
                        .row(key)
                        .map_or(false, |r| r.value(&def.target.name).is_null());
                    if let (true, Some(zero)) = (unset, def.initial_value()) {
                        self.set_derived(ws, key, def, zero);
                    }
                }
                DerivationKind::Formula(_) => self.enqueue(def.id, def.target.attr, key),
            }
        }
    }

    /// Enqueue every rule reading `attr` of `key`.
    fn schedule_dependents(&mut self, ws: &WorkingSet<'_>, key: EntityKey, attr: AttrRef) {
        let rules = self.rules;
        let graph = self.graph;
        for dependent in graph.dependents(attr) {
            match dependent.role {
                DependencyRole::AggregateChild | DependencyRole::FormulaOwn => {
                    self.enqueue(dependent.rule, dependent.target, key)
                }
                DependencyRole::FormulaChildrenOf(relationship) => {
                    let Some(rel) = rules.relationship(relationship) else {
                        continue;
                    };
                    for child in ws.children_of(rel.child, &rel.fk.name, key) {
                        self.enqueue(dependent.rule, dependent.target, child);
                    }
                }
            }
        }
    }

    fn enqueue(&mut self, rule: RuleId, target: AttrRef, key: EntityKey) {
        let task = Task {
            rank: self.graph.rank(target),
            decl: self.rules.declaration_index(rule).unwrap_or(usize::MAX),
            key,
            rule,
        };
        self.queue.insert(task);
    }

    /// Move a child's contribution from what the parent reflects to what
    /// the child holds now.
    fn account_child(
        &mut self,
        ws: &mut WorkingSet<'_>,
        def: &DerivationDef,
        agg: &AggregateDef,
        child: EntityKey,
    ) -> EvalResult<()> {
        let old = self
            .accounted
            .entry((def.id, child))
            .or_insert_with(|| Contribution::of(agg, ws.prior(child)))
            .clone();
        let new = Contribution::of(agg, ws.row(child));
        if old == new {
            return Ok(());
        }

        match (&old, &new) {
            (Some(o), Some(n)) if o.parent == n.parent => {
                let delta = n
                    .amount
                    .checked_sub(&o.amount, def.kind)
                    .map_err(|e| EvaluationError::from_value(def.describe(), child, e))?;
                self.adjust(ws, def, child, n.parent, delta)?;
            }
            _ => {
                if let Some(o) = &old {
                    let delta = o
                        .amount
                        .negate(def.kind)
                        .map_err(|e| EvaluationError::from_value(def.describe(), child, e))?;
                    self.adjust(ws, def, child, o.parent, delta)?;
                }
                if let Some(n) = &new {
                    self.adjust(ws, def, child, n.parent, n.amount.clone())?;
                }
            }
        }

        self.accounted.insert((def.id, child), new);
        Ok(())
    }

    fn adjust(
        &mut self,
        ws: &mut WorkingSet<'_>,
        def: &DerivationDef,
        child: EntityKey,
        parent: EntityKey,
        delta: Value,
    ) -> EvalResult<()> {
        if ws.is_deleted(parent) {
            trace!(target: "rulebank::engine", rule = %def.describe(), parent = %parent, "parent deleted, adjustment skipped");
            return Ok(());
        }

        let current = match ws.row(parent) {
            Some(row) if row.type_id == def.target.attr.type_id => {
                row.value(&def.target.name).clone()
            }
            _ => {
                return Err(EvaluationError::MissingParent {
                    rule: def.describe(),
                    child,
                    parent,
                })
            }
        };

        let next = current
            .checked_add(&delta, def.kind)
            .map_err(|e| EvaluationError::from_value(def.describe(), parent, e))?;
        self.stats.adjustments += 1;
        if self.config.log_rule_values {
            debug!(target: "rulebank::logic", rule = %def.describe(), parent = %parent, child = %child, delta = %delta, "adjust");
        }
        self.set_derived(ws, parent, def, next);
        Ok(())
    }

    fn evaluate_formula(
        &mut self,
        ws: &mut WorkingSet<'_>,
        def: &DerivationDef,
        formula: &FormulaDef,
        key: EntityKey,
    ) -> EvalResult<()> {
        if ws.is_deleted(key) {
            return Ok(());
        }

        let value = {
            let row = match ws.row(key) {
                Some(row) if row.type_id == def.target.attr.type_id => row,
                _ => return Ok(()),
            };
            let parents = formula
                .parents
                .iter()
                .map(|p| {
                    let parent = row.reference(&p.fk.name).and_then(|pk| ws.row(pk));
                    (p.relationship_name.as_str(), parent)
                })
                .collect();
            let ctx = FormulaContext::new(row, parents);
            formula
                .formula
                .eval(&ctx)
                .map_err(|e| EvaluationError::formula(def.describe(), key, e.message))?
        };

        if !value.conforms_to(def.kind) {
            return Err(EvaluationError::type_mismatch(
                def.describe(),
                key,
                format!("expected {}, got {}", def.kind, value.type_name()),
            ));
        }

        self.stats.formulas_evaluated += 1;
        self.set_derived(ws, key, def, value);
        Ok(())
    }

    /// Write a derived value and schedule its dependents if it changed.
    fn set_derived(&mut self, ws: &mut WorkingSet<'_>, key: EntityKey, def: &DerivationDef, value: Value) {
        let Some(previous) = ws.set_attr(key, &def.target.name, value.clone()) else {
            return;
        };
        if previous.as_ref() == Some(&value) {
            return;
        }

        if self.config.log_rule_values {
            let old = previous.clone().unwrap_or(Value::Null);
            debug!(target: "rulebank::logic", rule = %def.describe(), key = %key, old = %old, new = %value, "derived");
        } else {
            debug!(target: "rulebank::logic", rule = %def.describe(), key = %key, "derived");
        }

        match self.derived_index.get(&(key, def.target.attr)) {
            Some(&i) => self.derived[i].current = value,
            None => {
                let op = if ws.is_inserted(key) {
                    Operation::Insert
                } else {
                    Operation::Update
                };
                self.derived_index
                    .insert((key, def.target.attr), self.derived.len());
                self.derived.push(DerivedChange {
                    key,
                    target: def.target.attr,
                    name: def.target.name.clone(),
                    rule: def.id,
                    original: previous,
                    current: value,
                    op,
                });
            }
        }

        self.schedule_dependents(ws, key, def.target.attr);
    }
}
