// ==========================================
// Dental Lab Flow - Inventory API
// ==========================================
// Outer boundary for the material ledger. Validates caller input,
// delegates to the repository, and turns low-stock alerts into
// operator notifications.
// ==========================================

use std::sync::Arc;

use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::inventory::{
    InventoryAlert, InventoryItem, InventoryItemPatch, InventoryMovement, MovementContext,
    NewInventoryItem,
};
use crate::domain::types::MovementType;
use crate::domain::workflow::MaterialUsage;
use crate::engine::events::{Notification, NotificationSeverity, Notifier};
use crate::engine::material_broker::{MaterialUsageBroker, StockCheck};
use crate::repository::inventory_repo::{InventoryRepository, MovementOutcome};

pub struct InventoryApi {
    repo: Arc<InventoryRepository>,
    broker: Arc<MaterialUsageBroker>,
    notifier: Notifier,
}

impl InventoryApi {
    pub fn new(repo: Arc<InventoryRepository>, broker: Arc<MaterialUsageBroker>) -> Self {
        Self {
            repo,
            broker,
            notifier: Notifier::none(),
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    // ==========================================
    // items
    // ==========================================

    pub fn add_item(&self, new_item: &NewInventoryItem, user_id: &str) -> ApiResult<InventoryItem> {
        let item = self.repo.insert_item(new_item, user_id)?;
        info!(material_id = %item.id, name = %item.name, "inventory item added");
        Ok(item)
    }

    pub fn update_item(
        &self,
        item_id: &str,
        patch: &InventoryItemPatch,
    ) -> ApiResult<InventoryItem> {
        Ok(self.repo.update_item(item_id, patch)?)
    }

    pub fn get_item(&self, item_id: &str) -> ApiResult<InventoryItem> {
        self.repo
            .find_item(item_id)?
            .ok_or_else(|| ApiError::NotFound(format!("inventory item {}", item_id)))
    }

    pub fn list_items(&self, active_only: bool) -> ApiResult<Vec<InventoryItem>> {
        Ok(self.repo.list_items(active_only)?)
    }

    // ==========================================
    // movements
    // ==========================================

    /// Register a manual movement. A low-stock alert produced by the
    /// ledger is forwarded to the operator channel.
    pub fn register_movement(
        &self,
        material_id: &str,
        quantity: f64,
        movement_type: MovementType,
        ctx: &MovementContext,
    ) -> ApiResult<MovementOutcome> {
        if quantity == 0.0 {
            return Err(ApiError::InvalidInput(
                "movement quantity must not be zero".to_string(),
            ));
        }

        let outcome = self.repo.register_movement(material_id, quantity, movement_type, ctx)?;
        if let Some(alert) = &outcome.alert {
            self.notifier.send(Notification::new(
                alert.message.clone(),
                NotificationSeverity::Warning,
            ));
        }
        Ok(outcome)
    }

    pub fn list_movements(&self, material_id: &str) -> ApiResult<Vec<InventoryMovement>> {
        Ok(self.repo.list_movements(material_id)?)
    }

    /// Returns (recorded quantity, sum of movement deltas); the two
    /// must agree for a consistent ledger
    pub fn reconcile(&self, material_id: &str) -> ApiResult<(f64, f64)> {
        Ok(self.repo.reconcile(material_id)?)
    }

    // ==========================================
    // alerts
    // ==========================================

    pub fn list_alerts(
        &self,
        material_id: Option<&str>,
        unresolved_only: bool,
    ) -> ApiResult<Vec<InventoryAlert>> {
        Ok(self.repo.list_alerts(material_id, unresolved_only)?)
    }

    pub fn mark_alert_read(&self, alert_id: &str) -> ApiResult<()> {
        Ok(self.repo.mark_alert_read(alert_id)?)
    }

    pub fn resolve_alert(&self, alert_id: &str) -> ApiResult<()> {
        Ok(self.repo.resolve_alert(alert_id)?)
    }

    // ==========================================
    // stock checks
    // ==========================================

    /// Advisory check ahead of an advance; actual deduction re-checks
    /// atomically inside the ledger transaction
    pub fn check_sufficient_stock(&self, materials: &[MaterialUsage]) -> ApiResult<StockCheck> {
        Ok(self.broker.check_sufficient_stock(materials)?)
    }
}
