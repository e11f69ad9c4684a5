//! Property tests for incremental aggregates.
//!
//! After any sequence of units of work, every parent's sum and count must
//! equal a full recomputation over the committed children.

use proptest::prelude::*;
use rulebank_tests::prelude::*;

const CUSTOMERS: usize = 3;

/// Customer.balance = sum(Order.amount), Customer.order_count = count(Order).
fn ledger_rules() -> Result<RuleSet, ConfigurationError> {
    let mut builder = RuleSetBuilder::new();
    builder
        .add_type("Customer")
        .attr(AttrDef::new("balance", ValueKind::Int))
        .attr(AttrDef::new("order_count", ValueKind::Int))
        .done()?;
    builder
        .add_type("Order")
        .attr(AttrDef::new("customer_id", ValueKind::Ref))
        .attr(AttrDef::new("amount", ValueKind::Int))
        .done()?;
    builder
        .add_relationship("orders")
        .parent("Customer")
        .child("Order")
        .via("customer_id")
        .done()?;
    builder
        .derive_sum("Customer", "balance")
        .of("Order", "amount")
        .done()?;
    builder
        .derive_count("Customer", "order_count")
        .of("Order")
        .done()?;
    builder.build()
}

#[derive(Debug, Clone)]
enum Op {
    Insert { customer: usize, amount: i64 },
    Update { order: usize, amount: i64 },
    Move { order: usize, customer: usize },
    Delete { order: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..CUSTOMERS, -1000i64..1000).prop_map(|(customer, amount)| Op::Insert { customer, amount }),
        (any::<usize>(), -1000i64..1000).prop_map(|(order, amount)| Op::Update { order, amount }),
        (any::<usize>(), 0..CUSTOMERS).prop_map(|(order, customer)| Op::Move { order, customer }),
        any::<usize>().prop_map(|order| Op::Delete { order }),
    ]
}

fn units_strategy() -> impl Strategy<Value = Vec<Vec<Op>>> {
    prop::collection::vec(prop::collection::vec(op_strategy(), 1..6), 1..8)
}

/// Apply `units` one commit at a time, recomputing after each.
fn run_units(units: Vec<Vec<Op>>) -> ScenarioResult<()> {
    let mut h = Harness::new(ledger_rules()?)?;
    let mut customers = Vec::with_capacity(CUSTOMERS);
    for _ in 0..CUSTOMERS {
        let (key, _) = h.run(|uow| uow.insert("Customer", attrs! {}))?;
        customers.push(key);
    }
    let order_type = h
        .bank
        .compiled()
        .rules
        .type_id("Order")
        .ok_or_else(|| ScenarioError::assertion_failed("setup", "Order type missing"))?;

    let mut live: Vec<EntityKey> = Vec::new();
    for (step, unit) in units.into_iter().enumerate() {
        let mut pending = live.clone();
        let (_, _) = h.run(|uow| {
            for op in unit {
                match op {
                    Op::Insert { customer, amount } => {
                        let key = uow.insert(
                            "Order",
                            attrs! { "customer_id" => customers[customer], "amount" => amount },
                        )?;
                        pending.push(key);
                    }
                    Op::Update { order, amount } if !pending.is_empty() => {
                        let key = pending[order % pending.len()];
                        uow.update(key, attrs! { "amount" => amount })?;
                    }
                    Op::Move { order, customer } if !pending.is_empty() => {
                        let key = pending[order % pending.len()];
                        uow.update(key, attrs! { "customer_id" => customers[customer] })?;
                    }
                    Op::Delete { order } if !pending.is_empty() => {
                        let key = pending.remove(order % pending.len());
                        uow.delete(key)?;
                    }
                    _ => {}
                }
            }
            Ok(())
        })?;
        live = pending;

        for &customer in &customers {
            let children: Vec<_> = h
                .store
                .rows_of_type(order_type)
                .into_iter()
                .filter(|row| row.reference("customer_id") == Some(customer))
                .collect();
            let expected_sum: i64 = children
                .iter()
                .map(|row| row.value("amount").as_int().unwrap_or(0))
                .sum();
            let expected_count = children.len() as i64;

            let actual = (h.int(customer, "balance"), h.int(customer, "order_count"));
            if actual != (Some(expected_sum), Some(expected_count)) {
                return Err(ScenarioError::assertion_failed(
                    format!("unit {}", step),
                    format!(
                        "{} holds {:?}, recomputed ({}, {})",
                        customer, actual, expected_sum, expected_count
                    ),
                ));
            }
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Incremental adjustments agree with a full recomputation.
    #[test]
    fn aggregates_match_recomputation(units in units_strategy()) {
        let result = run_units(units).map_err(|e| e.to_string());
        prop_assert_eq!(result, Ok(()));
    }
}

// ========== TEST: move_and_delete_in_one_unit ==========
#[test]
fn test_move_and_delete_in_one_unit() -> ScenarioResult<()> {
    run_units(vec![
        vec![
            Op::Insert { customer: 0, amount: 10 },
            Op::Insert { customer: 1, amount: 20 },
        ],
        vec![
            Op::Move { order: 0, customer: 2 },
            Op::Update { order: 0, amount: 15 },
            Op::Delete { order: 1 },
        ],
    ])
}
