//! Multi-level cascade tests over the banking rules.
//!
//! Order.amount_owed is a formula feeding Customer.balance, which feeds
//! Customer.headroom; Order.customer_name reads the parent's name.

use pretty_assertions::assert_eq;
use rulebank_tests::prelude::*;

fn order(customer: EntityKey, total: i64, paid: i64) -> rulebank_core::Attributes {
    attrs! {
        "customer_id" => customer,
        "amount_total" => total,
        "amount_paid" => paid,
    }
}

fn banking() -> ScenarioResult<Harness> {
    Harness::new(banking_rules()?)
}

mod formulas {
    use super::*;
    use pretty_assertions::assert_eq;

    // ========== TEST: formula_feeds_aggregates ==========
    #[test]
    fn test_formula_feeds_aggregates() -> ScenarioResult<()> {
        // GIVEN a customer
        let mut h = banking()?;
        let c = h.customer("Alice")?;
        assert_eq!(h.int(c, "headroom"), Some(CREDIT_LIMIT));

        // WHEN two orders are placed, one fully paid
        let ((o1, o2), _) = h.run(|uow| {
            let o1 = uow.insert("Order", order(c, 800, 300))?;
            let o2 = uow.insert("Order", order(c, 400, 400))?;
            Ok((o1, o2))
        })?;

        // THEN every level is settled
        assert_eq!(h.int(o1, "amount_owed"), Some(500));
        assert_eq!(h.int(o2, "amount_owed"), Some(0));
        assert_eq!(h.int(c, "balance"), Some(500));
        assert_eq!(h.int(c, "order_count"), Some(2));
        assert_eq!(h.int(c, "unpaid_orders"), Some(1));
        assert_eq!(h.int(c, "headroom"), Some(1500));
        assert_eq!(h.value(o1, "customer_name"), Value::from("Alice"));
        Ok(())
    }

    // ========== TEST: parent_rename_cascades ==========
    #[test]
    fn test_parent_rename_cascades() -> ScenarioResult<()> {
        // GIVEN two orders under Alice
        let mut h = banking()?;
        let c = h.customer("Alice")?;
        let ((o1, o2), _) = h.run(|uow| {
            let o1 = uow.insert("Order", order(c, 100, 0))?;
            let o2 = uow.insert("Order", order(c, 200, 0))?;
            Ok((o1, o2))
        })?;

        // WHEN the customer is renamed
        let outcome = h.commit(|uow| uow.update(c, attrs! { "name" => "Alicia" }));

        // THEN both children pick up the new name
        expect("rename", &outcome, |a| a.committed().derived(2))?;
        assert_eq!(h.value(o1, "customer_name"), Value::from("Alicia"));
        assert_eq!(h.value(o2, "customer_name"), Value::from("Alicia"));
        Ok(())
    }

    // ========== TEST: payment_requalifies_count ==========
    #[test]
    fn test_payment_requalifies_count() -> ScenarioResult<()> {
        let mut h = banking()?;
        let c = h.customer("Alice")?;
        let (o, _) = h.run(|uow| uow.insert("Order", order(c, 600, 100)))?;
        assert_eq!(h.int(c, "unpaid_orders"), Some(1));

        // WHEN the order is paid in full
        let outcome = h.commit(|uow| uow.update(o, attrs! { "amount_paid" => 600i64 }));

        // THEN owed, balance, unpaid count and headroom move together
        expect("pay", &outcome, |a| a.committed().derived(4))?;
        let summary = outcome?;
        let mut derived: Vec<_> = summary
            .changes
            .derived()
            .map(|r| r.attr_name.as_str())
            .collect();
        derived.sort();
        assert_eq!(
            derived,
            vec!["amount_owed", "balance", "headroom", "unpaid_orders"]
        );
        assert_eq!(h.int(c, "unpaid_orders"), Some(0));
        assert_eq!(h.int(c, "order_count"), Some(1));
        assert_eq!(h.int(c, "headroom"), Some(CREDIT_LIMIT));
        Ok(())
    }

    // ========== TEST: formula_error_aborts ==========
    #[test]
    fn test_formula_error_aborts() -> ScenarioResult<()> {
        let mut h = banking()?;
        let c = h.customer("Alice")?;

        let outcome = h.commit(|uow| {
            uow.insert("Order", order(c, 100, 200))?;
            Ok(())
        });

        expect("overpay", &outcome, |a| a.error("paid 200 exceeds total 100"))?;
        assert!(matches!(outcome, Err(TransactionError::Evaluation(_))));
        assert_eq!(h.store.len(), 1);
        Ok(())
    }
}

mod constraints {
    use super::*;
    use pretty_assertions::assert_eq;

    // ========== TEST: soft_violation_warns ==========
    #[test]
    fn test_soft_violation_warns() -> ScenarioResult<()> {
        // GIVEN a customer with a 5000 credit limit
        let mut h = banking()?;
        let (c, _) = h.run(|uow| {
            uow.insert(
                "Customer",
                attrs! { "name" => "Big", "credit_limit" => 5000i64 },
            )
        })?;

        // WHEN an order above the review threshold is placed
        let outcome = h.commit(|uow| {
            uow.insert("Order", order(c, 1800, 0))?;
            Ok(())
        });

        // THEN it commits with a warning
        expect("large", &outcome, |a| a.warnings(&["large_order"]))?;
        let summary = outcome?;
        let messages: Vec<_> = summary.warnings.all().iter().map(|v| v.message.clone()).collect();
        assert_eq!(messages, vec!["order total 1800 needs review".to_string()]);
        assert_eq!(h.int(c, "headroom"), Some(3200));
        Ok(())
    }

    // ========== TEST: hard_and_soft_reported_together ==========
    #[test]
    fn test_hard_and_soft_reported_together() -> ScenarioResult<()> {
        let mut h = banking()?;
        let c = h.customer("Alice")?;

        let outcome = h.commit(|uow| {
            uow.insert("Order", order(c, 2500, 0))?;
            Ok(())
        });

        expect("too_large", &outcome, |a| {
            a.violations(&["credit_limit"])
                .message("balance (2500) exceeds credit limit (null)")
                .message("order total 2500 needs review")
        })?;
        Ok(())
    }
}

mod limits {
    use super::*;
    use pretty_assertions::assert_eq;

    // ========== TEST: task_limit_aborts ==========
    #[test]
    fn test_task_limit_aborts() -> ScenarioResult<()> {
        let h = banking()?;
        let mut h = h.with_config(EngineConfig {
            max_tasks: 3,
            ..EngineConfig::default()
        });
        let c = h.customer("Alice")?;

        let outcome = h.commit(|uow| {
            uow.insert("Order", order(c, 100, 0))?;
            uow.insert("Order", order(c, 200, 0))?;
            Ok(())
        });

        expect("burst", &outcome, |a| a.error("Maximum tasks (3) exceeded"))?;
        assert_eq!(h.store.len(), 1);
        Ok(())
    }
}

mod reparenting {
    use super::*;
    use pretty_assertions::assert_eq;

    // ========== TEST: move_updates_both_headrooms ==========
    #[test]
    fn test_move_updates_both_headrooms() -> ScenarioResult<()> {
        let mut h = banking()?;
        let a = h.customer("A")?;
        let b = h.customer("B")?;
        let (o, _) = h.run(|uow| uow.insert("Order", order(a, 900, 0)))?;
        assert_eq!(h.int(a, "headroom"), Some(1100));

        let outcome = h.commit(|uow| uow.update(o, attrs! { "customer_id" => b }));

        expect("move", &outcome, |x| x.committed())?;
        assert_eq!(h.int(a, "headroom"), Some(CREDIT_LIMIT));
        assert_eq!(h.int(b, "headroom"), Some(1100));
        assert_eq!(h.int(a, "order_count"), Some(0));
        assert_eq!(h.int(b, "order_count"), Some(1));
        assert_eq!(h.value(o, "customer_name"), Value::from("B"));
        Ok(())
    }

    // ========== TEST: move_to_new_customer ==========
    #[test]
    fn test_move_to_new_customer() -> ScenarioResult<()> {
        let mut h = banking()?;
        let a = h.customer("A")?;
        let (o, _) = h.run(|uow| uow.insert("Order", order(a, 300, 0)))?;

        let (n, summary) = h.run(|uow| {
            let n = uow.insert("Customer", attrs! { "name" => "New" })?;
            uow.update(o, attrs! { "customer_id" => n })?;
            Ok(n)
        })?;

        assert!(summary.changes.derived().any(|r| r.key == n && r.op == Operation::Insert));
        assert_eq!(h.int(n, "balance"), Some(300));
        assert_eq!(h.int(n, "headroom"), Some(1700));
        assert_eq!(h.int(a, "balance"), Some(0));
        assert_eq!(h.value(o, "customer_name"), Value::from("New"));
        Ok(())
    }

    // ========== TEST: delete_customer_with_orders ==========
    #[test]
    fn test_delete_customer_with_orders() -> ScenarioResult<()> {
        let mut h = banking()?;
        let c = h.customer("Alice")?;
        let (o, _) = h.run(|uow| uow.insert("Order", order(c, 300, 0)))?;

        let outcome = h.commit(|uow| {
            uow.delete(o)?;
            uow.delete(c)
        });

        expect("delete_all", &outcome, |a| a.committed().derived(0))?;
        assert!(h.store.is_empty());
        Ok(())
    }
}
