// ==========================================
// Dental Lab Flow - Workflow Domain Model
// ==========================================
// WorkflowInstance is the runtime record tracking one order's
// progress through its manufacturing steps.
// Invariants:
// - 0 <= current_step_index < steps.len()
// - exactly one step is in progress unless the instance is
//   COMPLETED / CANCELLED, and it is steps[current_step_index]
// ==========================================

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::types::{HistoryAction, StepStatus, WorkflowStatus};

// ==========================================
// MaterialUsage - material consumed by one step
// ==========================================
// automatic_deduction is fixed at request time and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialUsage {
    pub material_id: String,
    pub quantity: f64,
    pub unit: String,
    pub automatic_deduction: bool,
}

// ==========================================
// WorkflowStep - runtime state of one manufacturing step
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub step_type: String,
    pub status: StepStatus,
    pub assigned_to: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// Materials actually used in this step
    pub materials_used: Vec<MaterialUsage>,
}

impl WorkflowStep {
    /// Instantiate a pending step from a template step type
    pub fn pending(step_type: &str, assigned_to: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            step_type: step_type.to_string(),
            status: StepStatus::Pending,
            assigned_to,
            started_at: None,
            completed_at: None,
            notes: None,
            materials_used: Vec::new(),
        }
    }

    /// Append a line to the step notes
    pub fn append_note(&mut self, note: &str) {
        match &mut self.notes {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(note);
            }
            None => self.notes = Some(note.to_string()),
        }
    }
}

// ==========================================
// WorkflowHistoryEntry - append-only audit record
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowHistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub action: HistoryAction,
    pub description: String,
    pub actor: String,
}

impl WorkflowHistoryEntry {
    pub fn new(action: HistoryAction, description: impl Into<String>, actor: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            action,
            description: description.into(),
            actor: actor.to_string(),
        }
    }
}

// ==========================================
// WorkflowInstance
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: String,
    pub order_id: String,
    pub template_id: String,
    pub name: String,
    pub steps: Vec<WorkflowStep>,
    /// 0-based pointer into `steps`
    pub current_step_index: usize,
    pub status: WorkflowStatus,
    pub is_urgent: bool,
    pub started_at: DateTime<Utc>,
    pub estimated_delivery: NaiveDate,
    pub actual_delivery: Option<NaiveDate>,
    pub history: Vec<WorkflowHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    /// The step currently pointed at
    pub fn current_step(&self) -> Option<&WorkflowStep> {
        self.steps.get(self.current_step_index)
    }

    pub fn current_step_mut(&mut self) -> Option<&mut WorkflowStep> {
        self.steps.get_mut(self.current_step_index)
    }

    /// Derived progress: completed steps over total steps.
    /// Never stored; percentage consumers must derive from the step array.
    pub fn progress(&self) -> (usize, usize) {
        let completed = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        (completed, self.steps.len())
    }

    /// Verify the single-in-progress invariant.
    /// Used by tests and by the repository as a pre-save sanity check.
    pub fn invariant_holds(&self) -> bool {
        if self.steps.is_empty() || self.current_step_index >= self.steps.len() {
            return false;
        }
        if self.status.is_terminal() {
            return true;
        }
        let in_progress: Vec<usize> = self
            .steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status.is_in_progress())
            .map(|(i, _)| i)
            .collect();
        in_progress == vec![self.current_step_index]
    }

    /// Whether the pointer sits on the last step
    pub fn on_last_step(&self) -> bool {
        self.current_step_index + 1 == self.steps.len()
    }
}
