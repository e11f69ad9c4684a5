//! Activated rules shared by every unit of work.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use rulebank_core::Persistence;
use rulebank_graph::DependencyGraph;
use rulebank_registry::{ConfigResult, RuleSet};
use rulebank_rule::EngineConfig;
use tracing::info;

use crate::unit_of_work::UnitOfWork;

/// A rule set with its dependency graph.
#[derive(Debug)]
pub struct CompiledRules {
    pub rules: RuleSet,
    pub graph: DependencyGraph,
}

impl CompiledRules {
    /// Build the dependency graph of `rules`.
    pub fn compile(rules: RuleSet) -> ConfigResult<Self> {
        let graph = DependencyGraph::build(&rules)?;
        Ok(Self { rules, graph })
    }
}

/// Entry point: activated rules plus engine configuration.
///
/// Commits hold a read lock on the compiled rules for their whole run;
/// `redeclare` takes the write lock, so it waits for in-flight commits.
#[derive(Debug)]
pub struct LogicBank {
    compiled: RwLock<Arc<CompiledRules>>,
    config: EngineConfig,
}

impl LogicBank {
    /// Compile and activate a rule set. A cyclic or conflicting rule set is
    /// rejected here.
    pub fn activate(rules: RuleSet) -> ConfigResult<Self> {
        let compiled = CompiledRules::compile(rules)?;
        info!(
            target: "rulebank::engine",
            rules = compiled.rules.rule_count(),
            edges = compiled.graph.edge_count(),
            "rules activated"
        );
        Ok(Self {
            compiled: RwLock::new(Arc::new(compiled)),
            config: EngineConfig::default(),
        })
    }

    /// Replace the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Snapshot of the active rules.
    pub fn compiled(&self) -> Arc<CompiledRules> {
        self.compiled.read().clone()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Arc<CompiledRules>> {
        self.compiled.read()
    }

    /// Swap in a new rule set once no commit is running.
    ///
    /// The new set is compiled first and must keep the type ids and
    /// attribute kinds of the stored rows; on error the active rules are
    /// kept. Units of work begun before the swap can no longer commit.
    pub fn redeclare(&self, rules: RuleSet) -> ConfigResult<()> {
        let compiled = Arc::new(CompiledRules::compile(rules)?);
        let mut active = self.compiled.write();
        active.rules.check_redeclaration(&compiled.rules)?;
        *active = compiled;
        info!(target: "rulebank::engine", rules = active.rules.rule_count(), "rules redeclared");
        Ok(())
    }

    /// Start a unit of work against `store`, bound to the active rules.
    pub fn begin<'b, P: Persistence>(&'b self, store: &'b mut P) -> UnitOfWork<'b, P> {
        UnitOfWork::new(self, self.compiled(), store)
    }
}
