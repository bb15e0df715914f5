// ==========================================
// Dental Lab Flow - Material Usage Broker
// ==========================================
// Bridges workflow steps and the inventory ledger. Automatic usage
// deducts immediately; manual usage is parked as a pending deduction
// until a human confirms it. Each material settles independently:
// one insufficient-stock entry never blocks the others.
//
// check_sufficient_stock is advisory only. The ledger re-validates
// at write time, so a passing pre-check can still be followed by
// InsufficientStock from register_movement and callers must treat
// that as authoritative.
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::pending::{PendingDeduction, PendingUsageEntry};
use crate::domain::types::MovementType;
use crate::domain::workflow::MaterialUsage;
use crate::domain::MovementContext;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::inventory_repo::{InventoryRepository, MovementOutcome};
use crate::repository::pending_repo::PendingDeductionRepository;

// ==========================================
// Settlement report types
// ==========================================

/// One automatic entry that could not be deducted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementFailure {
    pub material_id: String,
    pub requested: f64,
    pub reason: String,
}

/// Aggregated outcome of register_usage: the one place in the system
/// where several independent results are reported together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageSettlement {
    /// Movement ids applied for automatic entries
    pub deducted_movements: Vec<String>,
    /// Automatic entries that failed (insufficient stock, unknown item)
    pub failures: Vec<SettlementFailure>,
    /// Manual entries parked for confirmation
    pub parked: usize,
}

impl UsageSettlement {
    /// True when every automatic entry was applied
    pub fn fully_settled(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One material short of the requested quantity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockShortage {
    pub material_id: String,
    pub requested: f64,
    pub available: f64,
}

/// Result of the advisory read-only stock check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockCheck {
    pub sufficient: bool,
    pub shortages: Vec<StockShortage>,
}

// ==========================================
// MaterialUsageBroker
// ==========================================
pub struct MaterialUsageBroker {
    inventory_repo: Arc<InventoryRepository>,
    pending_repo: Arc<PendingDeductionRepository>,
}

impl MaterialUsageBroker {
    pub fn new(
        inventory_repo: Arc<InventoryRepository>,
        pending_repo: Arc<PendingDeductionRepository>,
    ) -> Self {
        Self {
            inventory_repo,
            pending_repo,
        }
    }

    /// Settle the material usage of one workflow step.
    ///
    /// Automatic entries call the ledger immediately; a failed entry is
    /// reported in the settlement but does not block the rest. Manual
    /// entries are parked as pending deductions with deducted = false.
    pub fn register_usage(
        &self,
        workflow_id: &str,
        step_id: &str,
        materials: &[MaterialUsage],
        actor: &str,
    ) -> RepositoryResult<UsageSettlement> {
        let mut settlement = UsageSettlement::default();
        let mut manual_entries: Vec<PendingUsageEntry> = Vec::new();

        for usage in materials {
            // A non-positive quantity would flip the OUT delta positive
            // at the ledger, so it never reaches register_movement.
            if usage.quantity <= 0.0 {
                warn!(
                    material_id = %usage.material_id,
                    quantity = usage.quantity,
                    "usage entry rejected: non-positive quantity"
                );
                settlement.failures.push(SettlementFailure {
                    material_id: usage.material_id.clone(),
                    requested: usage.quantity,
                    reason: format!("quantity must be positive (got {})", usage.quantity),
                });
                continue;
            }
            if usage.automatic_deduction {
                let ctx = MovementContext {
                    user_id: actor.to_string(),
                    order_id: None,
                    workflow_step_id: Some(step_id.to_string()),
                    automatic_deduction: true,
                    confirmed: true,
                    notes: Some(format!("automatic deduction for workflow {}", workflow_id)),
                };
                match self.inventory_repo.register_movement(
                    &usage.material_id,
                    -usage.quantity,
                    MovementType::Out,
                    &ctx,
                ) {
                    Ok(MovementOutcome { movement, .. }) => {
                        debug!(
                            material_id = %usage.material_id,
                            quantity = usage.quantity,
                            "automatic deduction applied"
                        );
                        settlement.deducted_movements.push(movement.id);
                    }
                    Err(RepositoryError::InsufficientStock {
                        material_id,
                        requested,
                        available,
                    }) => {
                        warn!(
                            material_id = %material_id,
                            requested,
                            available,
                            "automatic deduction rejected: insufficient stock"
                        );
                        settlement.failures.push(SettlementFailure {
                            material_id,
                            requested,
                            reason: format!("insufficient stock (available {})", available),
                        });
                    }
                    Err(RepositoryError::NotFound { id, .. }) => {
                        warn!(material_id = %id, "automatic deduction rejected: unknown item");
                        settlement.failures.push(SettlementFailure {
                            material_id: id,
                            requested: usage.quantity,
                            reason: "unknown inventory item".to_string(),
                        });
                    }
                    Err(e) => return Err(e),
                }
            } else {
                manual_entries.push(PendingUsageEntry::from_usage(usage));
            }
        }

        if !manual_entries.is_empty() {
            settlement.parked =
                self.pending_repo
                    .register_entries(workflow_id, step_id, &manual_entries)?;
        }

        info!(
            workflow_id = %workflow_id,
            step_id = %step_id,
            deducted = settlement.deducted_movements.len(),
            parked = settlement.parked,
            failed = settlement.failures.len(),
            "material usage registered"
        );
        Ok(settlement)
    }

    /// Confirm one parked entry, applying the ledger movement.
    ///
    /// Fails NotFound if the entry is absent or already deducted (the
    /// second confirmation of the same entry never re-applies a
    /// movement). InsufficientStock propagates with the entry left
    /// untouched.
    pub fn confirm_deduction(
        &self,
        workflow_id: &str,
        step_id: &str,
        material_id: &str,
        confirmed_quantity: Option<f64>,
        actor: &str,
    ) -> RepositoryResult<String> {
        let entry = self
            .pending_repo
            .find_entry(workflow_id, step_id, material_id)?
            .ok_or_else(|| {
                RepositoryError::not_found(
                    "PendingUsageEntry",
                    &format!("{}/{}/{}", workflow_id, step_id, material_id),
                )
            })?;

        if entry.deducted {
            return Err(RepositoryError::not_found(
                "PendingUsageEntry",
                &format!("{}/{}/{} (already deducted)", workflow_id, step_id, material_id),
            ));
        }

        let quantity = confirmed_quantity.unwrap_or(entry.quantity);
        if quantity <= 0.0 {
            return Err(RepositoryError::ValidationError(format!(
                "confirmed quantity must be positive (got {})",
                quantity
            )));
        }

        // Claim the entry first: the atomic flip is what makes a
        // concurrent second confirmation fail before it can touch the
        // ledger.
        self.pending_repo
            .mark_deducted(workflow_id, step_id, material_id, actor)?;

        let ctx = MovementContext {
            user_id: actor.to_string(),
            order_id: None,
            workflow_step_id: Some(step_id.to_string()),
            automatic_deduction: false,
            confirmed: true,
            notes: Some(format!("confirmed deduction for workflow {}", workflow_id)),
        };

        let outcome = match self.inventory_repo.register_movement(
            material_id,
            -quantity,
            MovementType::Out,
            &ctx,
        ) {
            Ok(outcome) => outcome,
            Err(e) => {
                // ledger rejected the movement, so the claim goes back
                if let Err(release_err) =
                    self.pending_repo
                        .release_claim(workflow_id, step_id, material_id)
                {
                    warn!(
                        workflow_id = %workflow_id,
                        step_id = %step_id,
                        material_id = %material_id,
                        "failed to release claimed entry: {}",
                        release_err
                    );
                }
                return Err(e);
            }
        };

        info!(
            workflow_id = %workflow_id,
            step_id = %step_id,
            material_id = %material_id,
            quantity,
            "pending deduction confirmed"
        );
        Ok(outcome.movement.id)
    }

    /// Confirm every still-pending entry for a step.
    ///
    /// Already deducted entries are skipped, never re-applied. Returns
    /// true only if every outstanding entry was confirmed.
    pub fn confirm_all(
        &self,
        workflow_id: &str,
        step_id: &str,
        actor: &str,
    ) -> RepositoryResult<bool> {
        let pending = match self.pending_repo.find_by_step(workflow_id, step_id)? {
            Some(p) => p,
            None => return Ok(true),
        };

        let mut all_ok = true;
        for entry in pending.outstanding() {
            match self.confirm_deduction(workflow_id, step_id, &entry.material_id, None, actor) {
                Ok(_) => {}
                Err(RepositoryError::InsufficientStock { material_id, .. }) => {
                    warn!(
                        material_id = %material_id,
                        "confirm_all: entry left pending, insufficient stock"
                    );
                    all_ok = false;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(all_ok)
    }

    /// Advisory stock check: no reservation, no locking
    pub fn check_sufficient_stock(
        &self,
        materials: &[MaterialUsage],
    ) -> RepositoryResult<StockCheck> {
        let mut shortages = Vec::new();
        for usage in materials {
            let available = self
                .inventory_repo
                .find_item(&usage.material_id)?
                .map(|item| item.current_quantity)
                .unwrap_or(0.0);
            if available < usage.quantity {
                shortages.push(StockShortage {
                    material_id: usage.material_id.clone(),
                    requested: usage.quantity,
                    available,
                });
            }
        }
        Ok(StockCheck {
            sufficient: shortages.is_empty(),
            shortages,
        })
    }

    /// Steps with unconfirmed entries, for the confirmation worklist
    pub fn list_outstanding(&self) -> RepositoryResult<Vec<PendingDeduction>> {
        self.pending_repo.list_outstanding()
    }
}
