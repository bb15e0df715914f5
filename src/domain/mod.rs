// ==========================================
// Dental Lab Flow - Domain Layer
// ==========================================
// Entities and types. No I/O here; persistence lives in the
// repository layer, rules in the engine layer.
// ==========================================

pub mod inventory;
pub mod pending;
pub mod template;
pub mod types;
pub mod workflow;

pub use inventory::{
    InventoryAlert, InventoryItem, InventoryItemPatch, InventoryMovement, MovementContext,
    NewInventoryItem,
};
pub use pending::{PendingDeduction, PendingUsageEntry};
pub use template::{StepDefinition, WorkflowTemplate};
pub use types::{
    AlertType, HistoryAction, MovementType, ProcedureType, StepStatus, WorkflowStatus,
};
pub use workflow::{MaterialUsage, WorkflowHistoryEntry, WorkflowInstance, WorkflowStep};
