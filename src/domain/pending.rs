// ==========================================
// Dental Lab Flow - Pending Deduction Model
// ==========================================
// A pending deduction parks a step's material usage until a human
// confirms it. Entries flip to deducted at most once; confirmed
// entries keep confirmer and timestamp for audit.
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::workflow::MaterialUsage;

// ==========================================
// PendingUsageEntry - one material awaiting confirmation
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingUsageEntry {
    pub material_id: String,
    pub quantity: f64,
    pub unit: String,
    pub automatic_deduction: bool,
    pub deducted: bool,
    pub confirmed_by: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl PendingUsageEntry {
    /// Park a manual usage request (deducted = false)
    pub fn from_usage(usage: &MaterialUsage) -> Self {
        Self {
            material_id: usage.material_id.clone(),
            quantity: usage.quantity,
            unit: usage.unit.clone(),
            automatic_deduction: usage.automatic_deduction,
            deducted: false,
            confirmed_by: None,
            confirmed_at: None,
        }
    }
}

// ==========================================
// PendingDeduction - all parked usage for one workflow step
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDeduction {
    pub workflow_id: String,
    pub step_id: String,
    pub entries: Vec<PendingUsageEntry>,
}

impl PendingDeduction {
    /// True once every entry has been confirmed
    pub fn fully_deducted(&self) -> bool {
        self.entries.iter().all(|e| e.deducted)
    }

    /// Entries still awaiting confirmation
    pub fn outstanding(&self) -> impl Iterator<Item = &PendingUsageEntry> {
        self.entries.iter().filter(|e| !e.deducted)
    }
}
