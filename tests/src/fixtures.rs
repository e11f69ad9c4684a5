//! Rule sets and a store harness shared by the integration tests.

use rulebank_core::{attrs, EntityKey, Value, ValueKind};
use rulebank_registry::{AttrDef, ConfigResult, FormulaError, RuleSet, RuleSetBuilder};
use rulebank_rule::EngineConfig;
use rulebank_store::MemStore;
use rulebank_transaction::{CommitSummary, LogicBank, TransactionResult, UnitOfWork};

use crate::assertion::CommitOutcome;
use crate::error::ScenarioResult;

/// Limit enforced by the `credit_limit` constraint of the order balance rules.
pub const CREDIT_LIMIT: i64 = 2000;

/// Threshold above which `large_order` warns.
pub const LARGE_ORDER: i64 = 1500;

/// Customer.balance = sum(Order.amount_owed), balance <= 2000.
pub fn order_balance_rules() -> ConfigResult<RuleSet> {
    let mut builder = RuleSetBuilder::new();
    builder
        .add_type("Customer")
        .attr(AttrDef::new("name", ValueKind::String))
        .attr(AttrDef::new("balance", ValueKind::Int))
        .done()?;
    builder
        .add_type("Order")
        .attr(AttrDef::new("customer_id", ValueKind::Ref))
        .attr(AttrDef::new("amount_owed", ValueKind::Int))
        .attr(AttrDef::new("notes", ValueKind::String))
        .done()?;
    builder
        .add_relationship("orders")
        .parent("Customer")
        .child("Order")
        .via("customer_id")
        .done()?;

    builder
        .add_constraint("credit_limit")
        .for_type("Customer")
        .message("balance ({row.balance}) exceeds 2000")
        .check(|state| state.get("balance").as_int().unwrap_or(0) <= CREDIT_LIMIT)
        .done()?;
    builder
        .derive_sum("Customer", "balance")
        .of("Order", "amount_owed")
        .done()?;

    builder.build()
}

/// Order balance rules extended with counts, formulas and a soft constraint.
///
/// - Order.amount_owed = amount_total - amount_paid
/// - Order.customer_name copies the parent's name
/// - Customer.balance = sum(Order.amount_owed)
/// - Customer.order_count = count(Order)
/// - Customer.unpaid_orders = count(Order where amount_owed > 0)
/// - Customer.headroom = credit_limit - balance
/// - hard: balance <= credit_limit, soft: amount_total <= 1500
pub fn banking_rules() -> ConfigResult<RuleSet> {
    let mut builder = RuleSetBuilder::new();
    builder
        .add_type("Customer")
        .attr(AttrDef::new("name", ValueKind::String))
        .attr(AttrDef::new("credit_limit", ValueKind::Int))
        .attr(AttrDef::new("balance", ValueKind::Int))
        .attr(AttrDef::new("order_count", ValueKind::Int))
        .attr(AttrDef::new("unpaid_orders", ValueKind::Int))
        .attr(AttrDef::new("headroom", ValueKind::Int))
        .done()?;
    builder
        .add_type("Order")
        .attr(AttrDef::new("customer_id", ValueKind::Ref))
        .attr(AttrDef::new("amount_total", ValueKind::Int))
        .attr(AttrDef::new("amount_paid", ValueKind::Int))
        .attr(AttrDef::new("amount_owed", ValueKind::Int))
        .attr(AttrDef::new("customer_name", ValueKind::String))
        .done()?;
    builder
        .add_relationship("orders")
        .parent("Customer")
        .child("Order")
        .via("customer_id")
        .done()?;

    builder
        .add_constraint("credit_limit")
        .for_type("Customer")
        .message("balance ({row.balance}) exceeds credit limit ({row.credit_limit})")
        .check(|state| {
            let limit = state.get("credit_limit").as_int().unwrap_or(CREDIT_LIMIT);
            state.get("balance").as_int().unwrap_or(0) <= limit
        })
        .done()?;
    builder
        .add_constraint("large_order")
        .for_type("Order")
        .message("order total {row.amount_total} needs review")
        .soft()
        .check(|state| state.get("amount_total").as_int().unwrap_or(0) <= LARGE_ORDER)
        .done()?;

    builder
        .derive_formula("Order", "amount_owed")
        .depends_on(&["amount_total", "amount_paid"])
        .compute(|ctx| {
            let total = ctx.get("amount_total").as_int().unwrap_or(0);
            let paid = ctx.get("amount_paid").as_int().unwrap_or(0);
            if paid > total {
                return Err(FormulaError::new(format!(
                    "paid {} exceeds total {}",
                    paid, total
                )));
            }
            Ok(Value::Int(total - paid))
        })
        .done()?;
    builder
        .derive_formula("Order", "customer_name")
        .depends_on_parent("orders", "name")
        .compute(|ctx| Ok(ctx.parent_value("orders", "name").clone()))
        .done()?;
    builder
        .derive_sum("Customer", "balance")
        .of("Order", "amount_owed")
        .done()?;
    builder
        .derive_count("Customer", "order_count")
        .of("Order")
        .done()?;
    builder
        .derive_count("Customer", "unpaid_orders")
        .of("Order")
        .where_(&["amount_owed"], |row| {
            row.value("amount_owed").as_int().unwrap_or(0) > 0
        })
        .done()?;
    builder
        .derive_formula("Customer", "headroom")
        .depends_on(&["credit_limit", "balance"])
        .compute(|ctx| {
            let limit = ctx.get("credit_limit").as_int().unwrap_or(CREDIT_LIMIT);
            let balance = ctx.get("balance").as_int().unwrap_or(0);
            Ok(Value::Int(limit - balance))
        })
        .done()?;

    builder.build()
}

/// An activated bank over an in-memory store.
pub struct Harness {
    pub bank: LogicBank,
    pub store: MemStore,
}

impl Harness {
    /// Activate `rules` over an empty store.
    pub fn new(rules: RuleSet) -> ScenarioResult<Self> {
        Ok(Self {
            bank: LogicBank::activate(rules)?,
            store: MemStore::new(),
        })
    }

    /// Replace the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.bank = self.bank.with_config(config);
        self
    }

    /// Run `f` in a unit of work and commit it.
    pub fn run<T>(
        &mut self,
        f: impl FnOnce(&mut UnitOfWork<'_, MemStore>) -> TransactionResult<T>,
    ) -> TransactionResult<(T, CommitSummary)> {
        let mut uow = self.bank.begin(&mut self.store);
        let value = f(&mut uow)?;
        let summary = uow.commit()?;
        Ok((value, summary))
    }

    /// Run `f` in a unit of work and return the commit outcome.
    pub fn commit(
        &mut self,
        f: impl FnOnce(&mut UnitOfWork<'_, MemStore>) -> TransactionResult<()>,
    ) -> CommitOutcome {
        self.run(f).map(|(_, summary)| summary)
    }

    /// Commit a new customer.
    pub fn customer(&mut self, name: &str) -> ScenarioResult<EntityKey> {
        let (key, _) = self.run(|uow| uow.insert("Customer", attrs! { "name" => name }))?;
        Ok(key)
    }

    /// Committed value of an attribute, Null if the row or value is absent.
    pub fn value(&self, key: EntityKey, attr: &str) -> Value {
        self.store
            .get(key)
            .map_or(Value::Null, |row| row.value(attr).clone())
    }

    /// Committed integer value of an attribute.
    pub fn int(&self, key: EntityKey, attr: &str) -> Option<i64> {
        self.value(key, attr).as_int()
    }
}
