// ==========================================
// Dental Lab Flow - Domain Type Definitions
// ==========================================
// Status enums shared by workflow, inventory and broker.
// Serialized form: SCREAMING_SNAKE_CASE (matches the database columns)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// Workflow Status (whole instance)
// ==========================================
// ACTIVE -> WITH_DENTIST -> {ACTIVE | NEEDS_ADJUSTMENT} -> COMPLETED
// CANCELLED / PAUSED reachable from ACTIVE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Active,
    WithDentist,
    NeedsAdjustment,
    Completed,
    Cancelled,
    Paused,
}

impl WorkflowStatus {
    /// String form used for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Active => "ACTIVE",
            WorkflowStatus::WithDentist => "WITH_DENTIST",
            WorkflowStatus::NeedsAdjustment => "NEEDS_ADJUSTMENT",
            WorkflowStatus::Completed => "COMPLETED",
            WorkflowStatus::Cancelled => "CANCELLED",
            WorkflowStatus::Paused => "PAUSED",
        }
    }

    /// Parse from the stored string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(WorkflowStatus::Active),
            "WITH_DENTIST" => Some(WorkflowStatus::WithDentist),
            "NEEDS_ADJUSTMENT" => Some(WorkflowStatus::NeedsAdjustment),
            "COMPLETED" => Some(WorkflowStatus::Completed),
            "CANCELLED" => Some(WorkflowStatus::Cancelled),
            "PAUSED" => Some(WorkflowStatus::Paused),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Cancelled)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// Step Status (runtime state of one step)
// ==========================================
// PENDING -> IN_PROGRESS -> COMPLETED
// BLOCKED / DELAYED are reporting sub-states of an in-progress step
// and never gate transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
    Delayed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "PENDING",
            StepStatus::InProgress => "IN_PROGRESS",
            StepStatus::Completed => "COMPLETED",
            StepStatus::Blocked => "BLOCKED",
            StepStatus::Delayed => "DELAYED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(StepStatus::Pending),
            "IN_PROGRESS" => Some(StepStatus::InProgress),
            "COMPLETED" => Some(StepStatus::Completed),
            "BLOCKED" => Some(StepStatus::Blocked),
            "DELAYED" => Some(StepStatus::Delayed),
            _ => None,
        }
    }

    /// BLOCKED / DELAYED count as in-progress for the single
    /// in-progress-step invariant.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            StepStatus::InProgress | StepStatus::Blocked | StepStatus::Delayed
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// Procedure Type (template catalog key)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcedureType {
    TotalProsthesis,
    PartialProsthesis,
    FixedProsthesis,
    ImplantProtocol,
    OrthodonticAppliance,
}

impl ProcedureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcedureType::TotalProsthesis => "TOTAL_PROSTHESIS",
            ProcedureType::PartialProsthesis => "PARTIAL_PROSTHESIS",
            ProcedureType::FixedProsthesis => "FIXED_PROSTHESIS",
            ProcedureType::ImplantProtocol => "IMPLANT_PROTOCOL",
            ProcedureType::OrthodonticAppliance => "ORTHODONTIC_APPLIANCE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TOTAL_PROSTHESIS" => Some(ProcedureType::TotalProsthesis),
            "PARTIAL_PROSTHESIS" => Some(ProcedureType::PartialProsthesis),
            "FIXED_PROSTHESIS" => Some(ProcedureType::FixedProsthesis),
            "IMPLANT_PROTOCOL" => Some(ProcedureType::ImplantProtocol),
            "ORTHODONTIC_APPLIANCE" => Some(ProcedureType::OrthodonticAppliance),
            _ => None,
        }
    }

    /// All catalog keys, used when building the default catalog
    pub fn all() -> [ProcedureType; 5] {
        [
            ProcedureType::TotalProsthesis,
            ProcedureType::PartialProsthesis,
            ProcedureType::FixedProsthesis,
            ProcedureType::ImplantProtocol,
            ProcedureType::OrthodonticAppliance,
        ]
    }
}

impl fmt::Display for ProcedureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// Movement Type (signed inventory delta)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    In,
    Out,
    Adjustment,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
            MovementType::Adjustment => "ADJUSTMENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IN" => Some(MovementType::In),
            "OUT" => Some(MovementType::Out),
            "ADJUSTMENT" => Some(MovementType::Adjustment),
            _ => None,
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// Alert Type
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    LowStock,
    Expiration,
    Reorder,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::LowStock => "LOW_STOCK",
            AlertType::Expiration => "EXPIRATION",
            AlertType::Reorder => "REORDER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOW_STOCK" => Some(AlertType::LowStock),
            "EXPIRATION" => Some(AlertType::Expiration),
            "REORDER" => Some(AlertType::Reorder),
            _ => None,
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// History Action (append-only workflow audit)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryAction {
    Created,
    StepAdvanced,
    StepReverted,
    SentToDentist,
    ReceivedFromDentist,
    DeliveryDateUpdated,
    Paused,
    Resumed,
    Cancelled,
    Delivered,
    StepBlocked,
    StepDelayed,
    MaterialsRegistered,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "CREATED",
            HistoryAction::StepAdvanced => "STEP_ADVANCED",
            HistoryAction::StepReverted => "STEP_REVERTED",
            HistoryAction::SentToDentist => "SENT_TO_DENTIST",
            HistoryAction::ReceivedFromDentist => "RECEIVED_FROM_DENTIST",
            HistoryAction::DeliveryDateUpdated => "DELIVERY_DATE_UPDATED",
            HistoryAction::Paused => "PAUSED",
            HistoryAction::Resumed => "RESUMED",
            HistoryAction::Cancelled => "CANCELLED",
            HistoryAction::Delivered => "DELIVERED",
            HistoryAction::StepBlocked => "STEP_BLOCKED",
            HistoryAction::StepDelayed => "STEP_DELAYED",
            HistoryAction::MaterialsRegistered => "MATERIALS_REGISTERED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATED" => Some(HistoryAction::Created),
            "STEP_ADVANCED" => Some(HistoryAction::StepAdvanced),
            "STEP_REVERTED" => Some(HistoryAction::StepReverted),
            "SENT_TO_DENTIST" => Some(HistoryAction::SentToDentist),
            "RECEIVED_FROM_DENTIST" => Some(HistoryAction::ReceivedFromDentist),
            "DELIVERY_DATE_UPDATED" => Some(HistoryAction::DeliveryDateUpdated),
            "PAUSED" => Some(HistoryAction::Paused),
            "RESUMED" => Some(HistoryAction::Resumed),
            "CANCELLED" => Some(HistoryAction::Cancelled),
            "DELIVERED" => Some(HistoryAction::Delivered),
            "STEP_BLOCKED" => Some(HistoryAction::StepBlocked),
            "STEP_DELAYED" => Some(HistoryAction::StepDelayed),
            "MATERIALS_REGISTERED" => Some(HistoryAction::MaterialsRegistered),
            _ => None,
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_status_roundtrip() {
        for s in [
            WorkflowStatus::Active,
            WorkflowStatus::WithDentist,
            WorkflowStatus::NeedsAdjustment,
            WorkflowStatus::Completed,
            WorkflowStatus::Cancelled,
            WorkflowStatus::Paused,
        ] {
            assert_eq!(WorkflowStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(WorkflowStatus::parse("UNKNOWN"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Cancelled.is_terminal());
        assert!(!WorkflowStatus::Active.is_terminal());
        assert!(!WorkflowStatus::Paused.is_terminal());
    }

    #[test]
    fn test_step_status_in_progress_substates() {
        assert!(StepStatus::InProgress.is_in_progress());
        assert!(StepStatus::Blocked.is_in_progress());
        assert!(StepStatus::Delayed.is_in_progress());
        assert!(!StepStatus::Pending.is_in_progress());
        assert!(!StepStatus::Completed.is_in_progress());
    }
}
