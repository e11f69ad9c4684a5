//! Customer orders integration tests.
//!
//! Customer.balance = sum(Order.amount_owed), constraint balance <= 2000.
//! Focus areas: abort on violation, changes before commit, moving and
//! deleting children, no-op units of work.

use pretty_assertions::assert_eq;
use rulebank_tests::prelude::*;

fn order(customer: EntityKey, amount: i64) -> rulebank_core::Attributes {
    attrs! { "customer_id" => customer, "amount_owed" => amount }
}

mod credit_limit {
    use super::*;
    use pretty_assertions::assert_eq;

    // ========== TEST: orders_over_limit_abort ==========
    #[test]
    fn test_orders_over_limit_abort() -> ScenarioResult<()> {
        // GIVEN customer C with no orders
        let mut h = Harness::new(order_balance_rules()?)?;
        let c = h.customer("Alice")?;
        assert_eq!(h.int(c, "balance"), Some(0));

        // WHEN orders of 500 and 1600 are created together
        let outcome = h.commit(|uow| {
            uow.insert("Order", order(c, 500))?;
            uow.insert("Order", order(c, 1600))?;
            Ok(())
        });

        // THEN the unit of work is aborted and nothing is persisted
        expect("create_orders", &outcome, |a| {
            a.violations(&["credit_limit"])
                .message("balance (2100) exceeds 2000")
        })?;
        assert_eq!(h.int(c, "balance"), Some(0));
        assert_eq!(h.store.len(), 1);
        Ok(())
    }

    // ========== TEST: reduced_before_commit ==========
    #[test]
    fn test_reduced_before_commit() -> ScenarioResult<()> {
        // GIVEN customer C with no orders
        let mut h = Harness::new(order_balance_rules()?)?;
        let c = h.customer("Alice")?;

        // WHEN O2 is reduced to 1400 before the commit
        let outcome = h.commit(|uow| {
            uow.insert("Order", order(c, 500))?;
            let o2 = uow.insert("Order", order(c, 1600))?;
            uow.update(o2, attrs! { "amount_owed" => 1400i64 })?;
            Ok(())
        });

        // THEN the balance is 1900 and everything is persisted
        expect("create_and_reduce", &outcome, |a| a.committed().derived(1))?;
        assert_eq!(h.int(c, "balance"), Some(1900));
        assert_eq!(h.store.len(), 3);
        Ok(())
    }

    // ========== TEST: new_customer_over_limit ==========
    #[test]
    fn test_new_customer_over_limit() -> ScenarioResult<()> {
        let mut h = Harness::new(order_balance_rules()?)?;

        let outcome = h.commit(|uow| {
            let c = uow.insert("Customer", attrs! { "name" => "Bob" })?;
            uow.insert("Order", order(c, 2001))?;
            Ok(())
        });

        expect("create_customer_and_order", &outcome, |a| {
            a.violations(&["credit_limit"])
        })?;
        assert!(h.store.is_empty());
        Ok(())
    }

    // ========== TEST: cascade_violation_aborts_child_update ==========
    #[test]
    fn test_cascade_violation_aborts_child_update() -> ScenarioResult<()> {
        // GIVEN an order of 500
        let mut h = Harness::new(order_balance_rules()?)?;
        let c = h.customer("Alice")?;
        let (o, _) = h.run(|uow| uow.insert("Order", order(c, 500)))?;

        // WHEN only the order is written, raising the balance over the limit
        let outcome = h.commit(|uow| uow.update(o, attrs! { "amount_owed" => 2500i64 }));

        // THEN the customer, touched only by cascade, aborts the unit of work
        expect("raise_order", &outcome, |a| {
            a.violations(&["credit_limit"])
                .error_matches(r"credit_limit on Customer #\d+")
        })?;
        assert_eq!(h.int(o, "amount_owed"), Some(500));
        assert_eq!(h.int(c, "balance"), Some(500));
        Ok(())
    }
}

mod adjustments {
    use super::*;
    use pretty_assertions::assert_eq;

    // ========== TEST: move_between_customers ==========
    #[test]
    fn test_move_between_customers() -> ScenarioResult<()> {
        // GIVEN an order of 700 under A
        let mut h = Harness::new(order_balance_rules()?)?;
        let a = h.customer("A")?;
        let b = h.customer("B")?;
        let (o, _) = h.run(|uow| uow.insert("Order", order(a, 700)))?;

        // WHEN it moves to B
        let outcome = h.commit(|uow| uow.update(o, attrs! { "customer_id" => b }));

        // THEN both balances are adjusted in the same unit of work
        expect("move", &outcome, |x| x.committed().derived(2))?;
        let summary = outcome?;
        let balances: Vec<_> = summary
            .changes
            .derived()
            .map(|r| (r.key, r.old_value().clone(), r.new_value().clone()))
            .collect();
        assert_eq!(
            balances,
            vec![
                (a, Value::Int(700), Value::Int(0)),
                (b, Value::Int(0), Value::Int(700)),
            ]
        );
        assert_eq!(h.int(a, "balance"), Some(0));
        assert_eq!(h.int(b, "balance"), Some(700));
        Ok(())
    }

    // ========== TEST: delete_order ==========
    #[test]
    fn test_delete_order() -> ScenarioResult<()> {
        let mut h = Harness::new(order_balance_rules()?)?;
        let c = h.customer("Alice")?;
        let ((o1, _), _) = h.run(|uow| {
            let o1 = uow.insert("Order", order(c, 300))?;
            let o2 = uow.insert("Order", order(c, 900))?;
            Ok((o1, o2))
        })?;
        assert_eq!(h.int(c, "balance"), Some(1200));

        let outcome = h.commit(|uow| uow.delete(o1));

        expect("delete", &outcome, |a| a.committed().derived(1))?;
        let summary = outcome?;
        let deleted: Vec<_> = summary
            .changes
            .application()
            .map(|r| (r.attr_name.as_str(), r.op, r.new.clone()))
            .collect();
        assert_eq!(
            deleted,
            vec![
                ("customer_id", Operation::Delete, None),
                ("amount_owed", Operation::Delete, None),
            ]
        );
        assert_eq!(h.int(c, "balance"), Some(900));
        assert!(h.store.get(o1).is_none());
        Ok(())
    }

    // ========== TEST: no_deltas_no_adjustments ==========
    #[test]
    fn test_no_deltas_no_adjustments() -> ScenarioResult<()> {
        // GIVEN an order of 400
        let mut h = Harness::new(order_balance_rules()?)?;
        let c = h.customer("Alice")?;
        let (o, _) = h.run(|uow| uow.insert("Order", order(c, 400)))?;

        // WHEN the amount is rewritten unchanged and only notes change
        let outcome = h.commit(|uow| {
            uow.update(o, attrs! { "amount_owed" => 400i64, "notes" => "rush" })
        });

        // THEN no derived change is produced
        expect("touch", &outcome, |a| a.committed().derived(0))?;
        let summary = outcome?;
        assert_eq!(summary.changes.len(), 1);
        assert_eq!(summary.stats.adjustments, 0);
        assert_eq!(h.int(c, "balance"), Some(400));
        Ok(())
    }

    // ========== TEST: rollback_discards ==========
    #[test]
    fn test_rollback_discards() -> ScenarioResult<()> {
        let mut h = Harness::new(order_balance_rules()?)?;
        let c = h.customer("Alice")?;

        let mut uow = h.bank.begin(&mut h.store);
        uow.insert("Order", order(c, 100))?;
        uow.rollback()?;
        assert_eq!(uow.state(), UnitOfWorkState::Aborted);
        drop(uow);

        assert_eq!(h.store.len(), 1);
        assert_eq!(h.int(c, "balance"), Some(0));
        Ok(())
    }

    // ========== TEST: derived_write_rejected ==========
    #[test]
    fn test_derived_write_rejected() -> ScenarioResult<()> {
        let mut h = Harness::new(order_balance_rules()?)?;
        let c = h.customer("Alice")?;

        let outcome = h.commit(|uow| uow.update(c, attrs! { "balance" => 5i64 }));

        expect("write_balance", &outcome, |a| {
            a.error("Customer.balance is derived")
        })?;
        Ok(())
    }
}
