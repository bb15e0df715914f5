// ==========================================
// API integration tests
// ==========================================
// Full order lifecycle through the public APIs, with recording
// collaborators standing in for the notification channel and the
// billing system.
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod workflow_api_test {
    use std::error::Error;
    use std::sync::{Arc, Mutex};

    use chrono::{Duration, Utc};
    use dental_lab_flow::api::{ApiError, InventoryApi, WorkflowApi};
    use dental_lab_flow::app::AppState;
    use dental_lab_flow::domain::inventory::MovementContext;
    use dental_lab_flow::domain::types::{MovementType, ProcedureType, WorkflowStatus};
    use dental_lab_flow::domain::workflow::MaterialUsage;
    use dental_lab_flow::engine::events::{
        Notification, NotificationChannel, NotificationSeverity, Notifier, ReceivableCreator,
        ReceivableRequest,
    };

    use crate::test_helpers::{build_context, create_test_db, seed_item, TestContext};

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<Notification>>,
    }

    impl NotificationChannel for RecordingChannel {
        fn notify(&self, notification: Notification) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.sent.lock().unwrap().push(notification);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingBilling {
        requests: Mutex<Vec<ReceivableRequest>>,
        fail: bool,
    }

    impl ReceivableCreator for RecordingBilling {
        fn create(&self, request: ReceivableRequest) -> Result<String, Box<dyn Error + Send + Sync>> {
            if self.fail {
                return Err("billing system offline".into());
            }
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            Ok(format!("rcv-{}", requests.len()))
        }
    }

    struct ApiFixture {
        ctx: TestContext,
        workflow_api: WorkflowApi,
        inventory_api: InventoryApi,
        channel: Arc<RecordingChannel>,
        billing: Arc<RecordingBilling>,
    }

    fn build_apis(db_path: &str, billing_fails: bool) -> ApiFixture {
        let ctx = build_context(db_path);
        let channel = Arc::new(RecordingChannel::default());
        let billing = Arc::new(RecordingBilling {
            fail: billing_fails,
            ..Default::default()
        });
        let notifier = Notifier::with_channel(channel.clone());
        let workflow_api = WorkflowApi::new(
            ctx.engine.clone(),
            ctx.broker.clone(),
            ctx.workflow_repo.clone(),
        )
        .with_notifier(notifier.clone())
        .with_receivable_creator(billing.clone());
        let inventory_api =
            InventoryApi::new(ctx.inventory_repo.clone(), ctx.broker.clone()).with_notifier(notifier);
        ApiFixture {
            ctx,
            workflow_api,
            inventory_api,
            channel,
            billing,
        }
    }

    #[test]
    fn full_order_lifecycle_ends_in_a_receivable() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let f = build_apis(&db_path, false);

        let resin = seed_item(&f.ctx.inventory_repo, "Acrylic resin", 500.0, 50.0);

        let wf = f
            .workflow_api
            .create_workflow("order-100", ProcedureType::TotalProsthesis, false, "reception")
            .unwrap();

        // five advances through the 6-step template, one with materials
        for i in 0..5 {
            let materials = if i == 4 {
                Some(vec![MaterialUsage {
                    material_id: resin.clone(),
                    quantity: 60.0,
                    unit: "g".to_string(),
                    automatic_deduction: true,
                }])
            } else {
                None
            };
            f.workflow_api
                .advance_step(&wf.id, None, materials, "tech-ana")
                .unwrap();
        }

        let outcome = f
            .workflow_api
            .deliver(&wf.id, "Clinica Sorriso", 850.0, "reception")
            .unwrap();

        assert_eq!(outcome.workflow.status, WorkflowStatus::Completed);
        assert!(outcome.workflow.actual_delivery.is_some());
        assert_eq!(outcome.receivable_id.as_deref(), Some("rcv-1"));

        let requests = f.billing.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].related_order_id, "order-100");
        assert_eq!(requests[0].amount, 850.0);
        assert_eq!(requests[0].order_client, "Clinica Sorriso");
        assert_eq!(
            requests[0].due_date,
            Utc::now().date_naive() + Duration::days(30)
        );

        // the deduction actually happened
        let item = f.inventory_api.get_item(&resin).unwrap();
        assert_eq!(item.current_quantity, 440.0);
    }

    #[test]
    fn delivery_stands_even_when_billing_is_down() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let f = build_apis(&db_path, true);

        let wf = f
            .workflow_api
            .create_workflow("order-101", ProcedureType::OrthodonticAppliance, true, "reception")
            .unwrap();
        for _ in 0..3 {
            f.workflow_api
                .advance_step(&wf.id, None, None, "tech-ana")
                .unwrap();
        }

        let outcome = f
            .workflow_api
            .deliver(&wf.id, "Clinica Sorriso", 300.0, "reception")
            .unwrap();

        assert_eq!(outcome.workflow.status, WorkflowStatus::Completed);
        assert!(outcome.receivable_id.is_none());

        // the operator heard about it
        let sent = f.channel.sent.lock().unwrap();
        assert!(sent.iter().any(|n| n.message.contains("order-101")));
    }

    #[test]
    fn deliver_before_the_last_step_is_rejected() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let f = build_apis(&db_path, false);

        let wf = f
            .workflow_api
            .create_workflow("order-102", ProcedureType::TotalProsthesis, false, "reception")
            .unwrap();

        let err = f
            .workflow_api
            .deliver(&wf.id, "Clinica Sorriso", 100.0, "reception")
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidTransition(_)));
        assert!(f.billing.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn negative_delivery_amount_is_invalid_input() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let f = build_apis(&db_path, false);

        let err = f
            .workflow_api
            .deliver("whatever", "Clinica Sorriso", -1.0, "reception")
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }

    #[test]
    fn failed_settlement_notifies_the_operator() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let f = build_apis(&db_path, false);

        let scarce = seed_item(&f.ctx.inventory_repo, "Zirconia block", 1.0, 0.0);
        let wf = f
            .workflow_api
            .create_workflow("order-103", ProcedureType::TotalProsthesis, false, "reception")
            .unwrap();

        let outcome = f
            .workflow_api
            .advance_step(
                &wf.id,
                None,
                Some(vec![MaterialUsage {
                    material_id: scarce.clone(),
                    quantity: 5.0,
                    unit: "pc".to_string(),
                    automatic_deduction: true,
                }]),
                "tech-ana",
            )
            .unwrap();

        assert!(!outcome.materials_settled());
        let sent = f.channel.sent.lock().unwrap();
        assert!(sent.iter().any(|n| n.message.contains(&scarce)));
    }

    #[test]
    fn rejected_transition_notifies_the_operator() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let f = build_apis(&db_path, false);

        let wf = f
            .workflow_api
            .create_workflow("order-107", ProcedureType::TotalProsthesis, false, "reception")
            .unwrap();

        // resuming a workflow that was never paused
        let err = f.workflow_api.resume_workflow(&wf.id, "tech-ana").unwrap_err();
        assert!(matches!(err, ApiError::InvalidTransition(_)));

        let sent = f.channel.sent.lock().unwrap();
        let warning = sent
            .iter()
            .find(|n| n.message.contains(&wf.id))
            .expect("no notification for the rejected transition");
        assert_eq!(warning.severity, NotificationSeverity::Warning);
        drop(sent);

        // an unknown workflow is a lookup miss, not a transition failure
        let err = f
            .workflow_api
            .pause_workflow("no-such-id", "cleanup", "tech-ana")
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        let sent = f.channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
    }

    #[test]
    fn low_stock_movement_notifies_the_operator() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let f = build_apis(&db_path, false);

        let item_id = seed_item(&f.ctx.inventory_repo, "Porcelain powder", 110.0, 100.0);

        let outcome = f
            .inventory_api
            .register_movement(
                &item_id,
                -15.0,
                MovementType::Out,
                &MovementContext {
                    user_id: "tech-ana".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(outcome.alert.is_some());

        let sent = f.channel.sent.lock().unwrap();
        assert!(sent.iter().any(|n| n.message.contains("Porcelain powder")));
    }

    #[test]
    fn zero_quantity_movement_is_invalid_input() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let f = build_apis(&db_path, false);

        let item_id = seed_item(&f.ctx.inventory_repo, "Plaster", 10.0, 1.0);
        let err = f
            .inventory_api
            .register_movement(
                &item_id,
                0.0,
                MovementType::Adjustment,
                &MovementContext::default(),
            )
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }

    #[test]
    fn manual_materials_confirm_through_the_api() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let f = build_apis(&db_path, false);

        let gold = seed_item(&f.ctx.inventory_repo, "Gold alloy", 50.0, 5.0);
        let wf = f
            .workflow_api
            .create_workflow("order-104", ProcedureType::TotalProsthesis, false, "reception")
            .unwrap();

        let outcome = f
            .workflow_api
            .advance_step(
                &wf.id,
                None,
                Some(vec![MaterialUsage {
                    material_id: gold.clone(),
                    quantity: 3.0,
                    unit: "g".to_string(),
                    automatic_deduction: false,
                }]),
                "tech-ana",
            )
            .unwrap();
        let step_id = outcome.workflow.steps[0].id.clone();
        assert_eq!(outcome.settlement.unwrap().parked, 1);

        f.workflow_api
            .confirm_material_usage(&wf.id, &step_id, &gold, None, "supervisor")
            .unwrap();

        let item = f.inventory_api.get_item(&gold).unwrap();
        assert_eq!(item.current_quantity, 47.0);

        // second confirmation maps to NotFound at the boundary
        let err = f
            .workflow_api
            .confirm_material_usage(&wf.id, &step_id, &gold, None, "supervisor")
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn queries_and_unknown_ids() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let f = build_apis(&db_path, false);

        let wf = f
            .workflow_api
            .create_workflow("order-105", ProcedureType::PartialProsthesis, false, "reception")
            .unwrap();

        assert!(matches!(
            f.workflow_api.get_workflow("no-such-id"),
            Err(ApiError::NotFound(_))
        ));
        assert_eq!(f.workflow_api.workflow_progress(&wf.id).unwrap(), (0, 5));

        let by_order = f
            .workflow_api
            .find_workflow_by_order("order-105")
            .unwrap()
            .unwrap();
        assert_eq!(by_order.id, wf.id);

        let active = f
            .workflow_api
            .list_workflows_by_status(WorkflowStatus::Active)
            .unwrap();
        assert_eq!(active.len(), 1);
    }

    #[test]
    fn app_state_boots_on_a_fresh_database() {
        let (_tmp, db_path) = create_test_db().unwrap();

        let state = AppState::new(db_path).unwrap();
        let wf = state
            .workflow_api
            .create_workflow("order-106", ProcedureType::FixedProsthesis, false, "reception")
            .unwrap();
        assert_eq!(wf.steps.len(), 5);
        assert!(state.inventory_api.list_items(true).unwrap().is_empty());
    }
}
