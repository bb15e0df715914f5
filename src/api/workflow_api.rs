// ==========================================
// Dental Lab Flow - Workflow API
// ==========================================
// Outer boundary for production workflows. Thin orchestration over
// the engine and the broker: translates errors for callers, raises
// operator notifications on partial settlements, and hands completed
// deliveries to the billing collaborator.
// ==========================================

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::domain::types::{ProcedureType, WorkflowStatus};
use crate::domain::workflow::{MaterialUsage, WorkflowInstance};
use crate::engine::events::{
    Notification, NotificationSeverity, Notifier, ReceivableCreator, ReceivableRequest,
};
use crate::engine::material_broker::MaterialUsageBroker;
use crate::engine::workflow_engine::{AdvanceOutcome, WorkflowEngine, WorkflowError};
use crate::repository::workflow_repo::WorkflowRepository;

/// Days of payment term applied to the receivable raised at delivery
const RECEIVABLE_TERM_DAYS: i64 = 30;

/// Result of deliver: the completed workflow plus the billing-side
/// receivable id, when the collaborator accepted the request.
#[derive(Debug)]
pub struct DeliveryOutcome {
    pub workflow: WorkflowInstance,
    pub receivable_id: Option<String>,
}

pub struct WorkflowApi {
    engine: Arc<WorkflowEngine>,
    broker: Arc<MaterialUsageBroker>,
    workflow_repo: Arc<WorkflowRepository>,
    notifier: Notifier,
    receivables: Option<Arc<dyn ReceivableCreator>>,
}

impl WorkflowApi {
    pub fn new(
        engine: Arc<WorkflowEngine>,
        broker: Arc<MaterialUsageBroker>,
        workflow_repo: Arc<WorkflowRepository>,
    ) -> Self {
        Self {
            engine,
            broker,
            workflow_repo,
            notifier: Notifier::none(),
            receivables: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_receivable_creator(mut self, creator: Arc<dyn ReceivableCreator>) -> Self {
        self.receivables = Some(creator);
        self
    }

    /// Surface a rejected transition to the operator before the error
    /// reaches the caller. Other engine errors pass through untouched.
    fn guard<T>(&self, workflow_id: &str, result: Result<T, WorkflowError>) -> ApiResult<T> {
        result.map_err(|e| {
            if matches!(e, WorkflowError::InvalidTransition { .. }) {
                self.notifier.send(Notification::new(
                    format!("Workflow {} rejected a transition: {}", workflow_id, e),
                    NotificationSeverity::Warning,
                ));
            }
            e.into()
        })
    }

    // ==========================================
    // lifecycle
    // ==========================================

    pub fn create_workflow(
        &self,
        order_id: &str,
        procedure: ProcedureType,
        urgent: bool,
        actor: &str,
    ) -> ApiResult<WorkflowInstance> {
        Ok(self.engine.create(order_id, procedure, urgent, actor)?)
    }

    /// Advance and report partial material settlements to the operator
    pub fn advance_step(
        &self,
        workflow_id: &str,
        notes: Option<&str>,
        materials: Option<Vec<MaterialUsage>>,
        actor: &str,
    ) -> ApiResult<AdvanceOutcome> {
        let outcome =
            self.guard(workflow_id, self.engine.advance(workflow_id, notes, materials, actor))?;

        if let Some(settlement) = &outcome.settlement {
            for failure in &settlement.failures {
                self.notifier.send(Notification::new(
                    format!(
                        "Material {} could not be deducted for workflow {}: {}",
                        failure.material_id, workflow_id, failure.reason
                    ),
                    NotificationSeverity::Warning,
                ));
            }
        }
        Ok(outcome)
    }

    pub fn revert_step(
        &self,
        workflow_id: &str,
        reason: &str,
        actor: &str,
    ) -> ApiResult<WorkflowInstance> {
        self.guard(workflow_id, self.engine.revert(workflow_id, reason, actor))
    }

    pub fn send_to_dentist(
        &self,
        workflow_id: &str,
        notes: Option<&str>,
        actor: &str,
    ) -> ApiResult<WorkflowInstance> {
        self.guard(workflow_id, self.engine.send_to_dentist(workflow_id, notes, actor))
    }

    pub fn receive_from_dentist(
        &self,
        workflow_id: &str,
        approved: bool,
        feedback: Option<&str>,
        actor: &str,
    ) -> ApiResult<WorkflowInstance> {
        self.guard(
            workflow_id,
            self.engine
                .receive_from_dentist(workflow_id, approved, feedback, actor),
        )
    }

    pub fn update_delivery_date(
        &self,
        workflow_id: &str,
        new_date: NaiveDate,
        reason: &str,
        actor: &str,
    ) -> ApiResult<WorkflowInstance> {
        Ok(self
            .engine
            .update_delivery_date(workflow_id, new_date, reason, actor)?)
    }

    pub fn pause_workflow(
        &self,
        workflow_id: &str,
        reason: &str,
        actor: &str,
    ) -> ApiResult<WorkflowInstance> {
        self.guard(workflow_id, self.engine.pause(workflow_id, reason, actor))
    }

    pub fn resume_workflow(&self, workflow_id: &str, actor: &str) -> ApiResult<WorkflowInstance> {
        self.guard(workflow_id, self.engine.resume(workflow_id, actor))
    }

    pub fn cancel_workflow(
        &self,
        workflow_id: &str,
        reason: &str,
        actor: &str,
    ) -> ApiResult<WorkflowInstance> {
        self.guard(workflow_id, self.engine.cancel(workflow_id, reason, actor))
    }

    pub fn mark_step_blocked(
        &self,
        workflow_id: &str,
        reason: &str,
        actor: &str,
    ) -> ApiResult<WorkflowInstance> {
        self.guard(workflow_id, self.engine.mark_step_blocked(workflow_id, reason, actor))
    }

    pub fn mark_step_delayed(
        &self,
        workflow_id: &str,
        reason: &str,
        actor: &str,
    ) -> ApiResult<WorkflowInstance> {
        self.guard(workflow_id, self.engine.mark_step_delayed(workflow_id, reason, actor))
    }

    // ==========================================
    // delivery
    // ==========================================

    /// Complete the workflow and raise the receivable with the billing
    /// collaborator. A billing failure never undoes the completion; it
    /// is logged, notified and reported as a missing receivable id.
    pub fn deliver(
        &self,
        workflow_id: &str,
        client: &str,
        amount: f64,
        actor: &str,
    ) -> ApiResult<DeliveryOutcome> {
        if amount < 0.0 {
            return Err(ApiError::InvalidInput(
                "delivery amount must not be negative".to_string(),
            ));
        }

        let today = Utc::now().date_naive();
        let workflow = self.guard(workflow_id, self.engine.complete(workflow_id, today, actor))?;

        let receivable_id = match &self.receivables {
            Some(creator) if amount > 0.0 => {
                let request = ReceivableRequest {
                    order_client: client.to_string(),
                    amount,
                    due_date: today + Duration::days(RECEIVABLE_TERM_DAYS),
                    related_order_id: workflow.order_id.clone(),
                };
                match creator.create(request) {
                    Ok(id) => Some(id),
                    Err(e) => {
                        warn!(
                            workflow_id = %workflow_id,
                            order_id = %workflow.order_id,
                            "receivable creation failed: {}",
                            e
                        );
                        self.notifier.send(Notification::new(
                            format!(
                                "Receivable for order {} could not be created: {}",
                                workflow.order_id, e
                            ),
                            NotificationSeverity::Critical,
                        ));
                        None
                    }
                }
            }
            _ => None,
        };

        info!(
            workflow_id = %workflow_id,
            order_id = %workflow.order_id,
            receivable = receivable_id.is_some(),
            "workflow delivered"
        );
        Ok(DeliveryOutcome {
            workflow,
            receivable_id,
        })
    }

    // ==========================================
    // material confirmations
    // ==========================================

    /// Confirm one manually-confirmed material for a completed step
    pub fn confirm_material_usage(
        &self,
        workflow_id: &str,
        step_id: &str,
        material_id: &str,
        confirmed_quantity: Option<f64>,
        actor: &str,
    ) -> ApiResult<String> {
        Ok(self.broker.confirm_deduction(
            workflow_id,
            step_id,
            material_id,
            confirmed_quantity,
            actor,
        )?)
    }

    /// Confirm every outstanding material of a step; false when some
    /// entry could not be deducted
    pub fn confirm_all_material_usage(
        &self,
        workflow_id: &str,
        step_id: &str,
        actor: &str,
    ) -> ApiResult<bool> {
        Ok(self.broker.confirm_all(workflow_id, step_id, actor)?)
    }

    // ==========================================
    // queries
    // ==========================================

    pub fn get_workflow(&self, workflow_id: &str) -> ApiResult<WorkflowInstance> {
        Ok(self.engine.get(workflow_id)?)
    }

    pub fn list_workflows_by_status(
        &self,
        status: WorkflowStatus,
    ) -> ApiResult<Vec<WorkflowInstance>> {
        Ok(self.workflow_repo.list_by_status(status)?)
    }

    pub fn find_workflow_by_order(&self, order_id: &str) -> ApiResult<Option<WorkflowInstance>> {
        Ok(self.workflow_repo.find_by_order(order_id)?)
    }

    /// Completed steps out of total, for progress display
    pub fn workflow_progress(&self, workflow_id: &str) -> ApiResult<(usize, usize)> {
        Ok(self.engine.get(workflow_id)?.progress())
    }
}
