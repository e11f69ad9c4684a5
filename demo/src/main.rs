//! Rulebank demo - customers, orders and a credit limit.
//!
//! Runs a short scenario against an in-memory store and prints each
//! outcome. Rule firings are logged on `rulebank::logic`; set `RUST_LOG`
//! to override the default filter, or pass `-v` for engine internals.

use std::env;

use rulebank_core::{attrs, EntityKey, ValueKind};
use rulebank_registry::{AttrDef, ConfigResult, ConfigurationError, RuleSet, RuleSetBuilder};
use rulebank_rule::EngineConfig;
use rulebank_store::MemStore;
use rulebank_transaction::{CommitSummary, LogicBank, TransactionError, TransactionResult, UnitOfWork};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CREDIT_LIMIT: i64 = 2000;

#[derive(Debug, Error)]
enum DemoError {
    #[error("rules rejected: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("{0}")]
    Transaction(#[from] TransactionError),
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "rulebank::logic=debug,rulebank::engine=debug"
    } else {
        "rulebank::logic=debug"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

/// Customer.balance = sum(Order.amount_owed), balance <= 2000.
fn declare() -> ConfigResult<RuleSet> {
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
        .message("balance ({row.balance}) exceeds credit limit of 2000")
        .check(|state| state.get("balance").as_int().unwrap_or(0) <= CREDIT_LIMIT)
        .done()?;
    builder
        .derive_sum("Customer", "balance")
        .of("Order", "amount_owed")
        .done()?;
    builder.build()
}

fn unit<T>(
    bank: &LogicBank,
    store: &mut MemStore,
    f: impl FnOnce(&mut UnitOfWork<'_, MemStore>) -> TransactionResult<T>,
) -> TransactionResult<(T, CommitSummary)> {
    let mut uow = bank.begin(store);
    let value = f(&mut uow)?;
    let summary = uow.commit()?;
    Ok((value, summary))
}

fn report(step: &str, outcome: &TransactionResult<CommitSummary>) {
    match outcome {
        Ok(summary) => {
            println!("{}: committed {} changes", step, summary.changes.len());
            for record in summary.changes.derived() {
                println!(
                    "  {} {}: {} -> {}",
                    record.key,
                    record.attr_name,
                    record.old_value(),
                    record.new_value()
                );
            }
        }
        Err(e) => println!("{}: aborted, {}", step, e),
    }
}

fn balance(store: &MemStore, key: EntityKey) -> String {
    store
        .get(key)
        .map_or_else(|| "missing".to_string(), |row| row.value("balance").to_string())
}

fn run() -> Result<(), DemoError> {
    let bank = LogicBank::activate(declare()?)?.with_config(EngineConfig::from_env());
    let mut store = MemStore::new();

    let ((alice, bob), _) = unit(&bank, &mut store, |uow| {
        let alice = uow.insert("Customer", attrs! { "name" => "Alice" })?;
        let bob = uow.insert("Customer", attrs! { "name" => "Bob" })?;
        Ok((alice, bob))
    })?;
    info!(target: "rulebank::engine", %alice, %bob, "customers created");

    let outcome = unit(&bank, &mut store, |uow| {
        uow.insert("Order", attrs! { "customer_id" => alice, "amount_owed" => 500i64 })?;
        uow.insert("Order", attrs! { "customer_id" => alice, "amount_owed" => 1600i64 })?;
        Ok(())
    })
    .map(|(_, summary)| summary);
    report("orders of 500 and 1600", &outcome);
    println!("  Alice balance: {}", balance(&store, alice));

    let outcome = unit(&bank, &mut store, |uow| {
        uow.insert("Order", attrs! { "customer_id" => alice, "amount_owed" => 500i64 })?;
        let second = uow.insert("Order", attrs! { "customer_id" => alice, "amount_owed" => 1600i64 })?;
        uow.update(second, attrs! { "amount_owed" => 1400i64 })?;
        Ok(second)
    });
    let second = match outcome {
        Ok((second, summary)) => {
            report("orders of 500 and 1600 reduced to 1400", &Ok(summary));
            second
        }
        Err(e) => return Err(e.into()),
    };
    println!("  Alice balance: {}", balance(&store, alice));

    let outcome = unit(&bank, &mut store, |uow| {
        uow.update(second, attrs! { "customer_id" => bob })
    })
    .map(|(_, summary)| summary);
    report("move the 1400 order to Bob", &outcome);
    println!(
        "  Alice balance: {}, Bob balance: {}",
        balance(&store, alice),
        balance(&store, bob)
    );

    Ok(())
}

fn main() {
    let verbose = env::args().skip(1).any(|arg| arg == "-v" || arg == "--verbose");
    init_tracing(verbose);

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
