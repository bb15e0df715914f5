// ==========================================
// Material usage broker tests
// ==========================================
// Automatic deduction, parked manual confirmations with at-most-once
// settlement, and partial-failure aggregation.
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod material_broker_test {
    use dental_lab_flow::domain::types::ProcedureType;
    use dental_lab_flow::domain::workflow::MaterialUsage;
    use dental_lab_flow::repository::error::RepositoryError;

    use crate::test_helpers::{build_context, create_test_db, seed_item};

    fn auto_usage(material_id: &str, quantity: f64) -> MaterialUsage {
        MaterialUsage {
            material_id: material_id.to_string(),
            quantity,
            unit: "g".to_string(),
            automatic_deduction: true,
        }
    }

    fn manual_usage(material_id: &str, quantity: f64) -> MaterialUsage {
        MaterialUsage {
            automatic_deduction: false,
            ..auto_usage(material_id, quantity)
        }
    }

    #[test]
    fn automatic_usage_deducts_and_crosses_the_alert_threshold() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let ctx = build_context(&db_path);

        let resin = seed_item(&ctx.inventory_repo, "Acrylic resin", 1200.0, 1000.0);

        let settlement = ctx
            .broker
            .register_usage("wf-1", "step-1", &[auto_usage(&resin, 200.0)], "tech-ana")
            .unwrap();

        assert!(settlement.fully_settled());
        assert_eq!(settlement.deducted_movements.len(), 1);
        assert_eq!(settlement.parked, 0);

        let item = ctx.inventory_repo.find_item(&resin).unwrap().unwrap();
        assert_eq!(item.current_quantity, 1000.0);

        // landing exactly on the minimum raises the alert
        let alerts = ctx.inventory_repo.list_alerts(Some(&resin), true).unwrap();
        assert_eq!(alerts.len(), 1);

        // the movement carries its provenance
        let movements = ctx.inventory_repo.list_movements(&resin).unwrap();
        let deduction = movements
            .iter()
            .find(|m| m.id == settlement.deducted_movements[0])
            .unwrap();
        assert!(deduction.automatic_deduction);
        assert!(deduction.confirmed);
        assert_eq!(deduction.workflow_step_id.as_deref(), Some("step-1"));
    }

    #[test]
    fn manual_usage_is_parked_until_confirmed() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let ctx = build_context(&db_path);

        let gold = seed_item(&ctx.inventory_repo, "Gold alloy", 50.0, 5.0);

        let settlement = ctx
            .broker
            .register_usage("wf-2", "step-7", &[manual_usage(&gold, 3.0)], "tech-ana")
            .unwrap();
        assert_eq!(settlement.parked, 1);
        assert!(settlement.deducted_movements.is_empty());

        // no stock touched yet
        let item = ctx.inventory_repo.find_item(&gold).unwrap().unwrap();
        assert_eq!(item.current_quantity, 50.0);
        assert_eq!(ctx.broker.list_outstanding().unwrap().len(), 1);

        let movement_id = ctx
            .broker
            .confirm_deduction("wf-2", "step-7", &gold, None, "supervisor")
            .unwrap();
        assert!(!movement_id.is_empty());

        let item = ctx.inventory_repo.find_item(&gold).unwrap().unwrap();
        assert_eq!(item.current_quantity, 47.0);
        assert!(ctx.broker.list_outstanding().unwrap().is_empty());
    }

    #[test]
    fn second_confirmation_is_rejected_and_deducts_nothing() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let ctx = build_context(&db_path);

        let gold = seed_item(&ctx.inventory_repo, "Gold alloy", 50.0, 5.0);
        ctx.broker
            .register_usage("wf-3", "step-2", &[manual_usage(&gold, 3.0)], "tech-ana")
            .unwrap();

        ctx.broker
            .confirm_deduction("wf-3", "step-2", &gold, None, "supervisor")
            .unwrap();
        let err = ctx
            .broker
            .confirm_deduction("wf-3", "step-2", &gold, None, "supervisor")
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));

        // exactly one deduction in the ledger (plus the initial stock)
        let item = ctx.inventory_repo.find_item(&gold).unwrap().unwrap();
        assert_eq!(item.current_quantity, 47.0);
        assert_eq!(ctx.inventory_repo.list_movements(&gold).unwrap().len(), 2);
    }

    #[test]
    fn confirmation_can_adjust_the_quantity() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let ctx = build_context(&db_path);

        let gold = seed_item(&ctx.inventory_repo, "Gold alloy", 50.0, 5.0);
        ctx.broker
            .register_usage("wf-4", "step-2", &[manual_usage(&gold, 3.0)], "tech-ana")
            .unwrap();

        ctx.broker
            .confirm_deduction("wf-4", "step-2", &gold, Some(4.5), "supervisor")
            .unwrap();

        let item = ctx.inventory_repo.find_item(&gold).unwrap().unwrap();
        assert_eq!(item.current_quantity, 45.5);
    }

    #[test]
    fn non_positive_confirmed_quantity_is_rejected() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let ctx = build_context(&db_path);

        let gold = seed_item(&ctx.inventory_repo, "Gold alloy", 50.0, 5.0);
        ctx.broker
            .register_usage("wf-5", "step-2", &[manual_usage(&gold, 3.0)], "tech-ana")
            .unwrap();

        let err = ctx
            .broker
            .confirm_deduction("wf-5", "step-2", &gold, Some(0.0), "supervisor")
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ValidationError(_)));

        // entry still outstanding
        assert_eq!(ctx.broker.list_outstanding().unwrap().len(), 1);
    }

    #[test]
    fn negative_usage_quantity_never_touches_the_ledger() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let ctx = build_context(&db_path);

        let resin = seed_item(&ctx.inventory_repo, "Acrylic resin", 100.0, 10.0);

        let settlement = ctx
            .broker
            .register_usage("wf-14", "step-1", &[auto_usage(&resin, -50.0)], "tech-ana")
            .unwrap();

        // a negated delta would inflate stock through an OUT movement
        assert!(!settlement.fully_settled());
        assert_eq!(settlement.failures.len(), 1);
        assert_eq!(settlement.failures[0].material_id, resin);
        assert!(settlement.deducted_movements.is_empty());

        let item = ctx.inventory_repo.find_item(&resin).unwrap().unwrap();
        assert_eq!(item.current_quantity, 100.0);
        // only the initial stock movement exists
        assert_eq!(ctx.inventory_repo.list_movements(&resin).unwrap().len(), 1);

        // zero-quantity manual entries are rejected the same way
        let settlement = ctx
            .broker
            .register_usage("wf-14", "step-2", &[manual_usage(&resin, 0.0)], "tech-ana")
            .unwrap();
        assert_eq!(settlement.failures.len(), 1);
        assert_eq!(settlement.parked, 0);
        assert!(ctx.broker.list_outstanding().unwrap().is_empty());
    }

    #[test]
    fn partial_automatic_failures_are_aggregated_not_fatal() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let ctx = build_context(&db_path);

        let resin = seed_item(&ctx.inventory_repo, "Acrylic resin", 500.0, 100.0);
        let scarce = seed_item(&ctx.inventory_repo, "Porcelain powder", 10.0, 5.0);

        let settlement = ctx
            .broker
            .register_usage(
                "wf-6",
                "step-3",
                &[
                    auto_usage(&resin, 50.0),
                    auto_usage(&scarce, 25.0),
                    auto_usage("no-such-material", 1.0),
                ],
                "tech-ana",
            )
            .unwrap();

        assert!(!settlement.fully_settled());
        assert_eq!(settlement.deducted_movements.len(), 1);
        assert_eq!(settlement.failures.len(), 2);

        // the successful deduction stands
        let item = ctx.inventory_repo.find_item(&resin).unwrap().unwrap();
        assert_eq!(item.current_quantity, 450.0);
        // the failed one never moved
        let item = ctx.inventory_repo.find_item(&scarce).unwrap().unwrap();
        assert_eq!(item.current_quantity, 10.0);
    }

    #[test]
    fn confirm_all_reports_partial_settlement() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let ctx = build_context(&db_path);

        let gold = seed_item(&ctx.inventory_repo, "Gold alloy", 50.0, 5.0);
        let scarce = seed_item(&ctx.inventory_repo, "Ceramic stain", 1.0, 0.0);

        ctx.broker
            .register_usage(
                "wf-7",
                "step-4",
                &[manual_usage(&gold, 3.0), manual_usage(&scarce, 2.0)],
                "tech-ana",
            )
            .unwrap();

        let all_settled = ctx.broker.confirm_all("wf-7", "step-4", "supervisor").unwrap();
        assert!(!all_settled);

        // the affordable entry went through, the short one is still parked
        let item = ctx.inventory_repo.find_item(&gold).unwrap().unwrap();
        assert_eq!(item.current_quantity, 47.0);
        let outstanding = ctx.broker.list_outstanding().unwrap();
        assert_eq!(outstanding.len(), 1);
        let unconfirmed: Vec<_> = outstanding[0].outstanding().collect();
        assert_eq!(unconfirmed.len(), 1);
        assert_eq!(unconfirmed[0].material_id, scarce);

        // nothing left means success, idempotently
        assert!(ctx.broker.confirm_all("wf-7", "step-99", "supervisor").unwrap());
    }

    #[test]
    fn stock_check_lists_shortages_without_deducting() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let ctx = build_context(&db_path);

        let resin = seed_item(&ctx.inventory_repo, "Acrylic resin", 30.0, 10.0);

        let check = ctx
            .broker
            .check_sufficient_stock(&[auto_usage(&resin, 50.0)])
            .unwrap();
        assert!(!check.sufficient);
        assert_eq!(check.shortages.len(), 1);
        assert_eq!(check.shortages[0].material_id, resin);

        let item = ctx.inventory_repo.find_item(&resin).unwrap().unwrap();
        assert_eq!(item.current_quantity, 30.0);

        let check = ctx
            .broker
            .check_sufficient_stock(&[auto_usage(&resin, 30.0)])
            .unwrap();
        assert!(check.sufficient);
    }

    #[test]
    fn advance_settles_caller_supplied_materials() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let ctx = build_context(&db_path);

        let resin = seed_item(&ctx.inventory_repo, "Acrylic resin", 500.0, 100.0);
        let wf = ctx
            .engine
            .create("order-20", ProcedureType::TotalProsthesis, false, "reception")
            .unwrap();

        let outcome = ctx
            .engine
            .advance(
                &wf.id,
                None,
                Some(vec![auto_usage(&resin, 40.0)]),
                "tech-ana",
            )
            .unwrap();

        assert!(outcome.materials_settled());
        let settlement = outcome.settlement.unwrap();
        assert_eq!(settlement.deducted_movements.len(), 1);

        let item = ctx.inventory_repo.find_item(&resin).unwrap().unwrap();
        assert_eq!(item.current_quantity, 460.0);

        // usage recorded on the completed step
        let reloaded = ctx.engine.get(&wf.id).unwrap();
        assert_eq!(reloaded.steps[0].materials_used.len(), 1);
        assert_eq!(reloaded.steps[0].materials_used[0].material_id, resin);
    }

    #[test]
    fn advance_survives_a_failed_settlement() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let ctx = build_context(&db_path);

        let scarce = seed_item(&ctx.inventory_repo, "Zirconia block", 1.0, 0.0);
        let wf = ctx
            .engine
            .create("order-21", ProcedureType::TotalProsthesis, false, "reception")
            .unwrap();

        let outcome = ctx
            .engine
            .advance(
                &wf.id,
                None,
                Some(vec![auto_usage(&scarce, 5.0)]),
                "tech-ana",
            )
            .unwrap();

        // the transition stands even though the deduction failed
        assert_eq!(outcome.workflow.current_step_index, 1);
        assert!(!outcome.materials_settled());
        let settlement = outcome.settlement.unwrap();
        assert_eq!(settlement.failures.len(), 1);
        assert_eq!(settlement.failures[0].material_id, scarce);
    }

    #[test]
    fn advance_without_materials_settles_nothing() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let ctx = build_context(&db_path);

        let wf = ctx
            .engine
            .create("order-22", ProcedureType::TotalProsthesis, false, "reception")
            .unwrap();
        let outcome = ctx.engine.advance(&wf.id, None, None, "tech-ana").unwrap();
        assert!(outcome.settlement.is_none());
        assert!(outcome.materials_settled());
    }
}
