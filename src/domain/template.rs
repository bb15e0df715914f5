// ==========================================
// Dental Lab Flow - Workflow Template Model
// ==========================================
// A template is the ordered blueprint of steps for one procedure
// type. Immutable once the catalog is loaded.
// ==========================================

use serde::{Deserialize, Serialize};

use crate::domain::types::ProcedureType;
use crate::domain::workflow::MaterialUsage;

// ==========================================
// StepDefinition - blueprint for one step
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub step_type: String,
    /// Role expected to execute the step (e.g. "TECHNICIAN", "CERAMIST")
    pub default_responsible: String,
    pub estimated_duration_hours: u32,
    /// Materials deducted by default when the step completes
    #[serde(default)]
    pub default_materials: Vec<MaterialUsage>,
}

// ==========================================
// WorkflowTemplate
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: String,
    pub name: String,
    pub procedure_type: ProcedureType,
    /// Canonical step ordering used when instantiating a workflow
    pub steps: Vec<StepDefinition>,
}

impl WorkflowTemplate {
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}
