// ==========================================
// Dental Lab Flow - Workflow Engine
// ==========================================
// Owns the lifecycle of one workflow instance per order: step
// sequence, current step pointer, overall status and the append-only
// history log.
//
// Concurrency: mutations are serialized per workflow id through a
// lock registry. Two concurrent advance/revert calls on the same id
// take turns; operations on different ids run in parallel.
//
// Persistence discipline: the repository commits steps + status +
// history in one transaction and the engine returns only what was
// persisted. Material settlement happens after the transition commit
// and its failures are surfaced in the outcome, never rolled into
// the transition.
// ==========================================

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::{CatalogError, TemplateCatalog};
use crate::domain::types::{HistoryAction, ProcedureType, StepStatus, WorkflowStatus};
use crate::domain::workflow::{
    MaterialUsage, WorkflowHistoryEntry, WorkflowInstance, WorkflowStep,
};
use crate::engine::material_broker::{MaterialUsageBroker, SettlementFailure, UsageSettlement};
use crate::engine::schedule;
use crate::repository::error::RepositoryError;
use crate::repository::workflow_repo::WorkflowRepository;
use uuid::Uuid;

// ==========================================
// Engine errors
// ==========================================

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("no template registered for procedure type {0}")]
    TemplateNotFound(ProcedureType),

    #[error("workflow not found: {0}")]
    NotFound(String),

    #[error("invalid transition: {from} -> {to}: {detail}")]
    InvalidTransition {
        from: String,
        to: String,
        detail: String,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Result of advance: the transition always reflects persisted state;
/// settlement carries the independent material outcomes, if any.
#[derive(Debug)]
pub struct AdvanceOutcome {
    pub workflow: WorkflowInstance,
    pub settlement: Option<UsageSettlement>,
}

impl AdvanceOutcome {
    /// False when some material failed to settle (partial success)
    pub fn materials_settled(&self) -> bool {
        self.settlement
            .as_ref()
            .map(|s| s.fully_settled())
            .unwrap_or(true)
    }
}

// ==========================================
// WorkflowEngine
// ==========================================
pub struct WorkflowEngine {
    workflow_repo: Arc<WorkflowRepository>,
    catalog: Arc<TemplateCatalog>,
    broker: Arc<MaterialUsageBroker>,
    /// Per-workflow mutation locks (single-writer per id)
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Business-day lead times (urgent, standard)
    lead_days: (u32, u32),
}

impl WorkflowEngine {
    pub fn new(
        workflow_repo: Arc<WorkflowRepository>,
        catalog: Arc<TemplateCatalog>,
        broker: Arc<MaterialUsageBroker>,
    ) -> Self {
        Self {
            workflow_repo,
            catalog,
            broker,
            locks: Mutex::new(HashMap::new()),
            lead_days: (schedule::URGENT_BUSINESS_DAYS, schedule::NORMAL_BUSINESS_DAYS),
        }
    }

    /// Override the compiled lead times, usually from config_kv
    pub fn with_lead_days(mut self, urgent_days: u32, standard_days: u32) -> Self {
        self.lead_days = (urgent_days, standard_days);
        self
    }

    /// Lock handle for one workflow id. The registry itself is only
    /// held long enough to clone the entry.
    fn lock_for(&self, workflow_id: &str) -> Arc<Mutex<()>> {
        let mut registry = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        registry
            .entry(workflow_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn load(&self, workflow_id: &str) -> WorkflowResult<WorkflowInstance> {
        self.workflow_repo
            .find_by_id(workflow_id)?
            .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))
    }

    fn persist(&self, wf: &mut WorkflowInstance) -> WorkflowResult<()> {
        wf.updated_at = Utc::now();
        self.workflow_repo.save_instance(wf)?;
        Ok(())
    }

    // ==========================================
    // create
    // ==========================================

    /// Instantiate a workflow from the template for `procedure`.
    ///
    /// Steps are created in template order, all PENDING except the
    /// first which starts IN_PROGRESS now. Estimated delivery is 3
    /// business days out for urgent orders, 7 otherwise.
    pub fn create(
        &self,
        order_id: &str,
        procedure: ProcedureType,
        urgent: bool,
        actor: &str,
    ) -> WorkflowResult<WorkflowInstance> {
        if order_id.trim().is_empty() {
            return Err(RepositoryError::ValidationError(
                "order_id must not be empty".to_string(),
            )
            .into());
        }

        let template = self.catalog.get(procedure).map_err(|e| match e {
            CatalogError::TemplateNotFound(p) => WorkflowError::TemplateNotFound(p),
            other => WorkflowError::Repository(RepositoryError::InternalError(other.to_string())),
        })?;

        let now = Utc::now();
        let mut steps: Vec<WorkflowStep> = template
            .steps
            .iter()
            .map(|def| WorkflowStep::pending(&def.step_type, None))
            .collect();
        if let Some(first) = steps.first_mut() {
            first.status = StepStatus::InProgress;
            first.started_at = Some(now);
        } else {
            return Err(RepositoryError::ValidationError(format!(
                "template {} has no steps",
                template.id
            ))
            .into());
        }

        let instance = WorkflowInstance {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            template_id: template.id.clone(),
            name: format!("{} - {}", template.name, order_id),
            steps,
            current_step_index: 0,
            status: WorkflowStatus::Active,
            is_urgent: urgent,
            started_at: now,
            estimated_delivery: schedule::estimated_delivery_with(
                now.date_naive(),
                urgent,
                self.lead_days.0,
                self.lead_days.1,
            ),
            actual_delivery: None,
            history: vec![WorkflowHistoryEntry::new(
                HistoryAction::Created,
                format!(
                    "Workflow created for order {} ({}{})",
                    order_id,
                    procedure,
                    if urgent { ", urgent" } else { "" }
                ),
                actor,
            )],
            created_at: now,
            updated_at: now,
        };

        self.workflow_repo.insert_instance(&instance)?;
        info!(
            workflow_id = %instance.id,
            order_id = %order_id,
            procedure = %procedure,
            urgent,
            steps = instance.steps.len(),
            "workflow created"
        );
        Ok(instance)
    }

    // ==========================================
    // advance / revert
    // ==========================================

    /// Complete the current step and start the next one.
    ///
    /// Materials supplied by the caller -- or, failing that, the
    /// completed step definition's defaults -- are settled through
    /// the broker after the transition commits. A settlement failure
    /// never rolls the transition back; it is surfaced in the outcome.
    pub fn advance(
        &self,
        workflow_id: &str,
        notes: Option<&str>,
        materials: Option<Vec<MaterialUsage>>,
        actor: &str,
    ) -> WorkflowResult<AdvanceOutcome> {
        let lock = self.lock_for(workflow_id);
        let _guard: MutexGuard<'_, ()> = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut wf = self.load(workflow_id)?;
        Self::ensure_mutable(&wf, "advance")?;

        if wf.on_last_step() {
            return Err(WorkflowError::InvalidTransition {
                from: format!("step {}", wf.current_step_index),
                to: format!("step {}", wf.current_step_index + 1),
                detail: "already on the last step".to_string(),
            });
        }

        let now = Utc::now();
        let completed_index = wf.current_step_index;

        // Resolve what to settle before mutating: caller materials win,
        // otherwise the completed step definition's defaults.
        let to_settle: Vec<MaterialUsage> = match materials {
            Some(m) => m,
            None => self
                .catalog
                .get_by_id(&wf.template_id)
                .and_then(|t| t.steps.get(completed_index))
                .map(|def| def.default_materials.clone())
                .unwrap_or_default(),
        };

        let (completed_type, next_type) = {
            let step = &mut wf.steps[completed_index];
            step.status = StepStatus::Completed;
            step.completed_at = Some(now);
            if let Some(n) = notes {
                step.append_note(n);
            }
            step.materials_used = to_settle.clone();
            let completed_type = step.step_type.clone();

            let next = &mut wf.steps[completed_index + 1];
            next.status = StepStatus::InProgress;
            next.started_at = Some(now);
            (completed_type, next.step_type.clone())
        };

        wf.current_step_index += 1;
        wf.history.push(WorkflowHistoryEntry::new(
            HistoryAction::StepAdvanced,
            format!(
                "Step {} ({}) completed; step {} ({}) started",
                completed_index + 1,
                completed_type,
                completed_index + 2,
                next_type
            ),
            actor,
        ));
        if !to_settle.is_empty() {
            wf.history.push(WorkflowHistoryEntry::new(
                HistoryAction::MaterialsRegistered,
                format!(
                    "{} material(s) registered for step {} ({})",
                    to_settle.len(),
                    completed_index + 1,
                    completed_type
                ),
                actor,
            ));
        }

        // Transition commits first; settlement is independent.
        self.persist(&mut wf)?;

        let completed_step_id = wf.steps[completed_index].id.clone();
        let settlement = if to_settle.is_empty() {
            None
        } else {
            match self
                .broker
                .register_usage(workflow_id, &completed_step_id, &to_settle, actor)
            {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!(
                        workflow_id = %workflow_id,
                        step_id = %completed_step_id,
                        "material settlement failed after step transition: {}",
                        e
                    );
                    Some(UsageSettlement {
                        deducted_movements: Vec::new(),
                        failures: to_settle
                            .iter()
                            .map(|u| SettlementFailure {
                                material_id: u.material_id.clone(),
                                requested: u.quantity,
                                reason: e.to_string(),
                            })
                            .collect(),
                        parked: 0,
                    })
                }
            }
        };

        info!(
            workflow_id = %workflow_id,
            step = wf.current_step_index,
            "workflow advanced"
        );
        Ok(AdvanceOutcome {
            workflow: wf,
            settlement,
        })
    }

    /// Step back to the previous step, recording the reason
    pub fn revert(
        &self,
        workflow_id: &str,
        reason: &str,
        actor: &str,
    ) -> WorkflowResult<WorkflowInstance> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut wf = self.load(workflow_id)?;
        Self::ensure_mutable(&wf, "revert")?;

        if wf.current_step_index == 0 {
            return Err(WorkflowError::InvalidTransition {
                from: "step 0".to_string(),
                to: "step -1".to_string(),
                detail: "already on the first step".to_string(),
            });
        }

        let idx = wf.current_step_index;
        {
            let step = &mut wf.steps[idx];
            step.status = StepStatus::Pending;
            step.started_at = None;
            step.completed_at = None;
        }
        {
            let prev = &mut wf.steps[idx - 1];
            prev.status = StepStatus::InProgress;
            prev.completed_at = None;
            prev.append_note(&format!("reverted: {}", reason));
        }
        wf.current_step_index = idx - 1;
        wf.history.push(WorkflowHistoryEntry::new(
            HistoryAction::StepReverted,
            format!("Reverted from step {} to step {}: {}", idx + 1, idx, reason),
            actor,
        ));

        self.persist(&mut wf)?;
        info!(workflow_id = %workflow_id, step = wf.current_step_index, "workflow reverted");
        Ok(wf)
    }

    // ==========================================
    // dentist round-trip
    // ==========================================

    pub fn send_to_dentist(
        &self,
        workflow_id: &str,
        notes: Option<&str>,
        actor: &str,
    ) -> WorkflowResult<WorkflowInstance> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut wf = self.load(workflow_id)?;
        if !matches!(
            wf.status,
            WorkflowStatus::Active | WorkflowStatus::NeedsAdjustment
        ) {
            return Err(Self::bad_status(&wf, WorkflowStatus::WithDentist));
        }

        wf.status = WorkflowStatus::WithDentist;
        wf.history.push(WorkflowHistoryEntry::new(
            HistoryAction::SentToDentist,
            match notes {
                Some(n) => format!("Sent to dentist for evaluation: {}", n),
                None => "Sent to dentist for evaluation".to_string(),
            },
            actor,
        ));

        self.persist(&mut wf)?;
        Ok(wf)
    }

    pub fn receive_from_dentist(
        &self,
        workflow_id: &str,
        approved: bool,
        feedback: Option<&str>,
        actor: &str,
    ) -> WorkflowResult<WorkflowInstance> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut wf = self.load(workflow_id)?;
        if wf.status != WorkflowStatus::WithDentist {
            return Err(Self::bad_status(&wf, WorkflowStatus::Active));
        }

        wf.status = if approved {
            WorkflowStatus::Active
        } else {
            WorkflowStatus::NeedsAdjustment
        };
        let verdict = if approved {
            "approved"
        } else {
            "adjustments requested"
        };
        wf.history.push(WorkflowHistoryEntry::new(
            HistoryAction::ReceivedFromDentist,
            match feedback {
                Some(f) => format!("Returned from dentist ({}): {}", verdict, f),
                None => format!("Returned from dentist ({})", verdict),
            },
            actor,
        ));

        self.persist(&mut wf)?;
        Ok(wf)
    }

    // ==========================================
    // delivery date / pause / resume / cancel
    // ==========================================

    /// Always allowed; the history records old date, new date, reason
    pub fn update_delivery_date(
        &self,
        workflow_id: &str,
        new_date: NaiveDate,
        reason: &str,
        actor: &str,
    ) -> WorkflowResult<WorkflowInstance> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut wf = self.load(workflow_id)?;
        let old_date = wf.estimated_delivery;
        wf.estimated_delivery = new_date;
        wf.history.push(WorkflowHistoryEntry::new(
            HistoryAction::DeliveryDateUpdated,
            format!(
                "Delivery date changed from {} to {}: {}",
                old_date, new_date, reason
            ),
            actor,
        ));

        self.persist(&mut wf)?;
        Ok(wf)
    }

    pub fn pause(
        &self,
        workflow_id: &str,
        reason: &str,
        actor: &str,
    ) -> WorkflowResult<WorkflowInstance> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut wf = self.load(workflow_id)?;
        if wf.status != WorkflowStatus::Active {
            return Err(Self::bad_status(&wf, WorkflowStatus::Paused));
        }
        wf.status = WorkflowStatus::Paused;
        wf.history.push(WorkflowHistoryEntry::new(
            HistoryAction::Paused,
            format!("Production paused: {}", reason),
            actor,
        ));
        self.persist(&mut wf)?;
        Ok(wf)
    }

    pub fn resume(&self, workflow_id: &str, actor: &str) -> WorkflowResult<WorkflowInstance> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut wf = self.load(workflow_id)?;
        if wf.status != WorkflowStatus::Paused {
            return Err(Self::bad_status(&wf, WorkflowStatus::Active));
        }
        wf.status = WorkflowStatus::Active;
        wf.history.push(WorkflowHistoryEntry::new(
            HistoryAction::Resumed,
            "Production resumed",
            actor,
        ));
        self.persist(&mut wf)?;
        Ok(wf)
    }

    pub fn cancel(
        &self,
        workflow_id: &str,
        reason: &str,
        actor: &str,
    ) -> WorkflowResult<WorkflowInstance> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut wf = self.load(workflow_id)?;
        if wf.status.is_terminal() {
            return Err(Self::bad_status(&wf, WorkflowStatus::Cancelled));
        }
        wf.status = WorkflowStatus::Cancelled;
        wf.history.push(WorkflowHistoryEntry::new(
            HistoryAction::Cancelled,
            format!("Workflow cancelled: {}", reason),
            actor,
        ));
        self.persist(&mut wf)?;
        info!(workflow_id = %workflow_id, "workflow cancelled");
        Ok(wf)
    }

    // ==========================================
    // step reporting sub-states
    // ==========================================

    /// Mark the current step BLOCKED (reporting only; does not gate
    /// transitions)
    pub fn mark_step_blocked(
        &self,
        workflow_id: &str,
        reason: &str,
        actor: &str,
    ) -> WorkflowResult<WorkflowInstance> {
        self.mark_step(workflow_id, StepStatus::Blocked, reason, actor)
    }

    /// Mark the current step DELAYED (reporting only)
    pub fn mark_step_delayed(
        &self,
        workflow_id: &str,
        reason: &str,
        actor: &str,
    ) -> WorkflowResult<WorkflowInstance> {
        self.mark_step(workflow_id, StepStatus::Delayed, reason, actor)
    }

    fn mark_step(
        &self,
        workflow_id: &str,
        status: StepStatus,
        reason: &str,
        actor: &str,
    ) -> WorkflowResult<WorkflowInstance> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut wf = self.load(workflow_id)?;
        Self::ensure_mutable(&wf, "mark step")?;

        let idx = wf.current_step_index;
        let step_type = {
            let step = &mut wf.steps[idx];
            if !step.status.is_in_progress() {
                return Err(WorkflowError::InvalidTransition {
                    from: step.status.to_string(),
                    to: status.to_string(),
                    detail: "only the in-progress step can be flagged".to_string(),
                });
            }
            step.status = status;
            step.append_note(reason);
            step.step_type.clone()
        };

        let action = if status == StepStatus::Blocked {
            HistoryAction::StepBlocked
        } else {
            HistoryAction::StepDelayed
        };
        wf.history.push(WorkflowHistoryEntry::new(
            action,
            format!("Step {} ({}) flagged {}: {}", idx + 1, step_type, status, reason),
            actor,
        ));

        self.persist(&mut wf)?;
        Ok(wf)
    }

    // ==========================================
    // completion
    // ==========================================

    /// Finish the workflow: completes the last step and sets COMPLETED
    /// with the actual delivery date. Only valid on the last step.
    pub fn complete(
        &self,
        workflow_id: &str,
        delivery_date: NaiveDate,
        actor: &str,
    ) -> WorkflowResult<WorkflowInstance> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut wf = self.load(workflow_id)?;
        Self::ensure_mutable(&wf, "complete")?;

        if !wf.on_last_step() {
            return Err(WorkflowError::InvalidTransition {
                from: format!("step {}", wf.current_step_index),
                to: "COMPLETED".to_string(),
                detail: "not on the last step".to_string(),
            });
        }

        let now = Utc::now();
        {
            let last = &mut wf.steps[wf.current_step_index];
            if last.status != StepStatus::Completed {
                last.status = StepStatus::Completed;
                last.completed_at = Some(now);
            }
        }
        wf.status = WorkflowStatus::Completed;
        wf.actual_delivery = Some(delivery_date);
        wf.history.push(WorkflowHistoryEntry::new(
            HistoryAction::Delivered,
            format!("Workflow completed, delivered on {}", delivery_date),
            actor,
        ));

        self.persist(&mut wf)?;
        info!(workflow_id = %workflow_id, "workflow completed");
        Ok(wf)
    }

    // ==========================================
    // queries
    // ==========================================

    pub fn get(&self, workflow_id: &str) -> WorkflowResult<WorkflowInstance> {
        self.load(workflow_id)
    }

    // ==========================================
    // guards
    // ==========================================

    /// Step mutations require an instance in active production.
    /// WITH_DENTIST, PAUSED and the terminal states reject them.
    fn ensure_mutable(wf: &WorkflowInstance, op: &str) -> WorkflowResult<()> {
        match wf.status {
            WorkflowStatus::Active | WorkflowStatus::NeedsAdjustment => Ok(()),
            other => Err(WorkflowError::InvalidTransition {
                from: other.to_string(),
                to: other.to_string(),
                detail: format!("{} not allowed while {}", op, other),
            }),
        }
    }

    fn bad_status(wf: &WorkflowInstance, wanted: WorkflowStatus) -> WorkflowError {
        WorkflowError::InvalidTransition {
            from: wf.status.to_string(),
            to: wanted.to_string(),
            detail: "status guard violated".to_string(),
        }
    }
}
