// ==========================================
// Dental Lab Flow - Inventory Domain Model
// ==========================================
// The movement log is the source of truth: an item's
// current_quantity must always equal the sum of its movement
// deltas. Non-negativity is enforced at the point of every
// movement, never by post-hoc correction.
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::types::{AlertType, MovementType};

// ==========================================
// InventoryItem
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: String,
    pub name: String,
    pub category: String,
    pub current_quantity: f64,
    /// Reorder threshold; dropping to or below it raises LOW_STOCK
    pub minimum_quantity: f64,
    pub unit: String,
    pub unit_price: f64,
    pub is_active: bool,
}

/// Input for creating a new inventory item (id assigned by the ledger)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInventoryItem {
    pub name: String,
    pub category: String,
    pub initial_quantity: f64,
    pub minimum_quantity: f64,
    pub unit: String,
    pub unit_price: f64,
}

/// Partial update for an existing item. None fields are left unchanged.
/// current_quantity is deliberately absent: quantity only moves through
/// the movement log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryItemPatch {
    pub name: Option<String>,
    pub category: Option<String>,
    pub minimum_quantity: Option<f64>,
    pub unit: Option<String>,
    pub unit_price: Option<f64>,
    pub is_active: Option<bool>,
}

// ==========================================
// InventoryMovement - one signed quantity delta
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub id: String,
    pub material_id: String,
    /// Signed delta: positive = inbound, negative = outbound
    pub quantity: f64,
    pub movement_type: MovementType,
    pub date: DateTime<Utc>,
    pub user_id: String,
    pub order_id: Option<String>,
    pub workflow_step_id: Option<String>,
    pub automatic_deduction: bool,
    pub confirmed: bool,
    pub notes: Option<String>,
}

/// Provenance attached to a movement (who, for which order/step, how)
#[derive(Debug, Clone, Default)]
pub struct MovementContext {
    pub user_id: String,
    pub order_id: Option<String>,
    pub workflow_step_id: Option<String>,
    pub automatic_deduction: bool,
    pub confirmed: bool,
    pub notes: Option<String>,
}

// ==========================================
// InventoryAlert
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryAlert {
    pub id: String,
    pub material_id: String,
    pub alert_type: AlertType,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
    pub is_resolved: bool,
}

impl InventoryAlert {
    /// Build the LOW_STOCK alert raised by an outbound movement that
    /// drops quantity to or below the minimum. The message embeds the
    /// item name and the new quantity.
    pub fn low_stock(item: &InventoryItem, new_quantity: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            material_id: item.id.clone(),
            alert_type: AlertType::LowStock,
            message: format!(
                "Low stock: {} is down to {} {} (minimum {})",
                item.name, new_quantity, item.unit, item.minimum_quantity
            ),
            timestamp: Utc::now(),
            is_read: false,
            is_resolved: false,
        }
    }
}
