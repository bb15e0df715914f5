// ==========================================
// Dental Lab Flow - Inventory Ledger Repository
// ==========================================
// Single source of truth for material quantities.
// register_movement is the only write path for current_quantity:
// it re-validates non-negativity inside one transaction, so a stale
// caller pre-check can never drive stock negative.
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::inventory::{
    InventoryAlert, InventoryItem, InventoryItemPatch, InventoryMovement, MovementContext,
    NewInventoryItem,
};
use crate::domain::types::{AlertType, MovementType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Outcome of a registered movement: the persisted movement plus the
/// low-stock alert it raised, if any.
#[derive(Debug, Clone)]
pub struct MovementOutcome {
    pub movement: InventoryMovement,
    pub alert: Option<InventoryAlert>,
    pub new_quantity: f64,
}

// ==========================================
// InventoryRepository
// ==========================================
pub struct InventoryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl InventoryRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseQueryError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // Item operations
    // ==========================================

    /// Create a new inventory item.
    ///
    /// Validation: name must not be blank, initial quantity must not be
    /// negative. A positive initial quantity is recorded as an inbound
    /// movement in the same transaction so the reconciliation invariant
    /// (quantity == sum of movement deltas) holds from day one.
    pub fn insert_item(
        &self,
        new_item: &NewInventoryItem,
        user_id: &str,
    ) -> RepositoryResult<InventoryItem> {
        if new_item.name.trim().is_empty() {
            return Err(RepositoryError::ValidationError(
                "item name must not be empty".to_string(),
            ));
        }
        if new_item.initial_quantity < 0.0 {
            return Err(RepositoryError::ValidationError(format!(
                "initial quantity must not be negative (got {})",
                new_item.initial_quantity
            )));
        }
        if new_item.minimum_quantity < 0.0 {
            return Err(RepositoryError::ValidationError(format!(
                "minimum quantity must not be negative (got {})",
                new_item.minimum_quantity
            )));
        }

        let item = InventoryItem {
            id: Uuid::new_v4().to_string(),
            name: new_item.name.trim().to_string(),
            category: new_item.category.clone(),
            current_quantity: new_item.initial_quantity,
            minimum_quantity: new_item.minimum_quantity,
            unit: new_item.unit.clone(),
            unit_price: new_item.unit_price,
            is_active: true,
        };

        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            r#"
            INSERT INTO inventory_item (
                id, name, category, current_quantity, minimum_quantity,
                unit, unit_price, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)
            "#,
            params![
                item.id,
                item.name,
                item.category,
                item.current_quantity,
                item.minimum_quantity,
                item.unit,
                item.unit_price,
            ],
        )?;

        if new_item.initial_quantity > 0.0 {
            tx.execute(
                r#"
                INSERT INTO inventory_movement (
                    id, material_id, quantity, movement_type, date, user_id,
                    order_id, workflow_step_id, automatic_deduction, confirmed, notes
                ) VALUES (?1, ?2, ?3, 'IN', ?4, ?5, NULL, NULL, 0, 1, 'initial stock')
                "#,
                params![
                    Uuid::new_v4().to_string(),
                    item.id,
                    new_item.initial_quantity,
                    Utc::now().to_rfc3339(),
                    user_id,
                ],
            )?;
        }

        tx.commit()?;
        Ok(item)
    }

    /// Apply a partial update. Quantity is not patchable: it only moves
    /// through register_movement.
    pub fn update_item(
        &self,
        item_id: &str,
        patch: &InventoryItemPatch,
    ) -> RepositoryResult<InventoryItem> {
        if let Some(min) = patch.minimum_quantity {
            if min < 0.0 {
                return Err(RepositoryError::ValidationError(format!(
                    "minimum quantity must not be negative (got {})",
                    min
                )));
            }
        }

        let conn = self.get_conn()?;
        let current = Self::query_item(&conn, item_id)?
            .ok_or_else(|| RepositoryError::not_found("InventoryItem", item_id))?;

        let updated = InventoryItem {
            id: current.id.clone(),
            name: patch.name.clone().unwrap_or(current.name),
            category: patch.category.clone().unwrap_or(current.category),
            current_quantity: current.current_quantity,
            minimum_quantity: patch.minimum_quantity.unwrap_or(current.minimum_quantity),
            unit: patch.unit.clone().unwrap_or(current.unit),
            unit_price: patch.unit_price.unwrap_or(current.unit_price),
            is_active: patch.is_active.unwrap_or(current.is_active),
        };

        conn.execute(
            r#"
            UPDATE inventory_item
            SET name = ?2, category = ?3, minimum_quantity = ?4,
                unit = ?5, unit_price = ?6, is_active = ?7
            WHERE id = ?1
            "#,
            params![
                updated.id,
                updated.name,
                updated.category,
                updated.minimum_quantity,
                updated.unit,
                updated.unit_price,
                updated.is_active as i32,
            ],
        )?;

        Ok(updated)
    }

    pub fn find_item(&self, item_id: &str) -> RepositoryResult<Option<InventoryItem>> {
        let conn = self.get_conn()?;
        Self::query_item(&conn, item_id)
    }

    pub fn list_items(&self, active_only: bool) -> RepositoryResult<Vec<InventoryItem>> {
        let conn = self.get_conn()?;
        let query = if active_only {
            "SELECT id, name, category, current_quantity, minimum_quantity, unit, unit_price, is_active
             FROM inventory_item WHERE is_active = 1 ORDER BY name"
        } else {
            "SELECT id, name, category, current_quantity, minimum_quantity, unit, unit_price, is_active
             FROM inventory_item ORDER BY name"
        };
        let mut stmt = conn.prepare(query)?;
        let rows = stmt.query_map([], Self::map_row_to_item)?;
        Ok(rows.collect::<SqliteResult<Vec<_>>>()?)
    }

    // ==========================================
    // Movement operations (the ledger proper)
    // ==========================================

    /// Register a signed quantity movement.
    ///
    /// Atomic within one transaction:
    /// 1. read current quantity
    /// 2. fail InsufficientStock if current + delta < 0 (nothing persisted)
    /// 3. insert the movement, update the item quantity
    /// 4. if the movement is outbound and the new quantity is at or below
    ///    the minimum, insert exactly one LOW_STOCK alert
    pub fn register_movement(
        &self,
        material_id: &str,
        quantity: f64,
        movement_type: MovementType,
        ctx: &MovementContext,
    ) -> RepositoryResult<MovementOutcome> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let item = Self::query_item(&tx, material_id)?
            .ok_or_else(|| RepositoryError::not_found("InventoryItem", material_id))?;

        let new_quantity = item.current_quantity + quantity;
        if new_quantity < 0.0 {
            // item left unchanged; transaction never commits
            return Err(RepositoryError::InsufficientStock {
                material_id: material_id.to_string(),
                requested: -quantity,
                available: item.current_quantity,
            });
        }

        let movement = InventoryMovement {
            id: Uuid::new_v4().to_string(),
            material_id: material_id.to_string(),
            quantity,
            movement_type,
            date: Utc::now(),
            user_id: ctx.user_id.clone(),
            order_id: ctx.order_id.clone(),
            workflow_step_id: ctx.workflow_step_id.clone(),
            automatic_deduction: ctx.automatic_deduction,
            confirmed: ctx.confirmed,
            notes: ctx.notes.clone(),
        };

        tx.execute(
            r#"
            INSERT INTO inventory_movement (
                id, material_id, quantity, movement_type, date, user_id,
                order_id, workflow_step_id, automatic_deduction, confirmed, notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                movement.id,
                movement.material_id,
                movement.quantity,
                movement.movement_type.as_str(),
                movement.date.to_rfc3339(),
                movement.user_id,
                movement.order_id,
                movement.workflow_step_id,
                movement.automatic_deduction as i32,
                movement.confirmed as i32,
                movement.notes,
            ],
        )?;

        tx.execute(
            "UPDATE inventory_item SET current_quantity = ?2 WHERE id = ?1",
            params![material_id, new_quantity],
        )?;

        // Alert only on outbound movements crossing the threshold
        let alert = if quantity < 0.0 && new_quantity <= item.minimum_quantity {
            let alert = InventoryAlert::low_stock(&item, new_quantity);
            Self::insert_alert_tx(&tx, &alert)?;
            Some(alert)
        } else {
            None
        };

        tx.commit()?;

        tracing::debug!(
            material_id = %material_id,
            delta = quantity,
            new_quantity,
            alert = alert.is_some(),
            "movement registered"
        );

        Ok(MovementOutcome {
            movement,
            alert,
            new_quantity,
        })
    }

    pub fn list_movements(&self, material_id: &str) -> RepositoryResult<Vec<InventoryMovement>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, material_id, quantity, movement_type, date, user_id,
                   order_id, workflow_step_id, automatic_deduction, confirmed, notes
            FROM inventory_movement
            WHERE material_id = ?1
            ORDER BY date
            "#,
        )?;
        let rows = stmt.query_map(params![material_id], Self::map_row_to_movement)?;
        Ok(rows.collect::<SqliteResult<Vec<_>>>()?)
    }

    /// Reconciliation check: current_quantity vs sum of movement deltas.
    /// Returns (current_quantity, movement_sum).
    pub fn reconcile(&self, material_id: &str) -> RepositoryResult<(f64, f64)> {
        let conn = self.get_conn()?;
        let item = Self::query_item(&conn, material_id)?
            .ok_or_else(|| RepositoryError::not_found("InventoryItem", material_id))?;
        let sum: f64 = conn.query_row(
            "SELECT COALESCE(SUM(quantity), 0) FROM inventory_movement WHERE material_id = ?1",
            params![material_id],
            |row| row.get(0),
        )?;
        Ok((item.current_quantity, sum))
    }

    // ==========================================
    // Alert operations
    // ==========================================

    pub fn create_alert(&self, alert: &InventoryAlert) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::insert_alert_tx(&conn, alert)?;
        Ok(())
    }

    pub fn list_alerts(
        &self,
        material_id: Option<&str>,
        unresolved_only: bool,
    ) -> RepositoryResult<Vec<InventoryAlert>> {
        let conn = self.get_conn()?;

        let base = "SELECT id, material_id, alert_type, message, timestamp, is_read, is_resolved
                    FROM inventory_alert";
        let query = match (material_id.is_some(), unresolved_only) {
            (true, true) => {
                format!("{base} WHERE material_id = ?1 AND is_resolved = 0 ORDER BY timestamp")
            }
            (true, false) => format!("{base} WHERE material_id = ?1 ORDER BY timestamp"),
            (false, true) => format!("{base} WHERE is_resolved = 0 ORDER BY timestamp"),
            (false, false) => format!("{base} ORDER BY timestamp"),
        };

        let mut stmt = conn.prepare(&query)?;
        let rows = if let Some(mid) = material_id {
            stmt.query_map(params![mid], Self::map_row_to_alert)?
                .collect::<SqliteResult<Vec<_>>>()?
        } else {
            stmt.query_map([], Self::map_row_to_alert)?
                .collect::<SqliteResult<Vec<_>>>()?
        };
        Ok(rows)
    }

    pub fn mark_alert_read(&self, alert_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let n = conn.execute(
            "UPDATE inventory_alert SET is_read = 1 WHERE id = ?1",
            params![alert_id],
        )?;
        if n == 0 {
            return Err(RepositoryError::not_found("InventoryAlert", alert_id));
        }
        Ok(())
    }

    pub fn resolve_alert(&self, alert_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let n = conn.execute(
            "UPDATE inventory_alert SET is_resolved = 1, is_read = 1 WHERE id = ?1",
            params![alert_id],
        )?;
        if n == 0 {
            return Err(RepositoryError::not_found("InventoryAlert", alert_id));
        }
        Ok(())
    }

    // ==========================================
    // Row mapping helpers
    // ==========================================

    fn query_item(conn: &Connection, item_id: &str) -> RepositoryResult<Option<InventoryItem>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, category, current_quantity, minimum_quantity, unit, unit_price, is_active
             FROM inventory_item WHERE id = ?1",
        )?;
        let result = stmt.query_row(params![item_id], Self::map_row_to_item);
        match result {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn insert_alert_tx(conn: &Connection, alert: &InventoryAlert) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO inventory_alert (
                id, material_id, alert_type, message, timestamp, is_read, is_resolved
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                alert.id,
                alert.material_id,
                alert.alert_type.as_str(),
                alert.message,
                alert.timestamp.to_rfc3339(),
                alert.is_read as i32,
                alert.is_resolved as i32,
            ],
        )?;
        Ok(())
    }

    fn map_row_to_item(row: &rusqlite::Row) -> SqliteResult<InventoryItem> {
        Ok(InventoryItem {
            id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            current_quantity: row.get(3)?,
            minimum_quantity: row.get(4)?,
            unit: row.get(5)?,
            unit_price: row.get(6)?,
            is_active: row.get::<_, i32>(7)? != 0,
        })
    }

    fn map_row_to_movement(row: &rusqlite::Row) -> SqliteResult<InventoryMovement> {
        Ok(InventoryMovement {
            id: row.get(0)?,
            material_id: row.get(1)?,
            quantity: row.get(2)?,
            movement_type: MovementType::parse(&row.get::<_, String>(3)?)
                .unwrap_or(MovementType::Adjustment),
            date: row
                .get::<_, String>(4)?
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
            user_id: row.get(5)?,
            order_id: row.get(6)?,
            workflow_step_id: row.get(7)?,
            automatic_deduction: row.get::<_, i32>(8)? != 0,
            confirmed: row.get::<_, i32>(9)? != 0,
            notes: row.get(10)?,
        })
    }

    fn map_row_to_alert(row: &rusqlite::Row) -> SqliteResult<InventoryAlert> {
        Ok(InventoryAlert {
            id: row.get(0)?,
            material_id: row.get(1)?,
            alert_type: AlertType::parse(&row.get::<_, String>(2)?).unwrap_or(AlertType::LowStock),
            message: row.get(3)?,
            timestamp: row
                .get::<_, String>(4)?
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
            is_read: row.get::<_, i32>(5)? != 0,
            is_resolved: row.get::<_, i32>(6)? != 0,
        })
    }
}
