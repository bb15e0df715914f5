// ==========================================
// Dental Lab Flow - Pending Deduction Repository
// ==========================================
// Parked material deductions awaiting human confirmation.
// Entries flip deducted 0 -> 1 at most once; the guard is the
// `deducted = 0` predicate on the update, so a second confirmation
// attempt matches no row and surfaces as NotFound.
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::pending::{PendingDeduction, PendingUsageEntry};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

// ==========================================
// PendingDeductionRepository
// ==========================================
pub struct PendingDeductionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PendingDeductionRepository {
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

    /// Park (or extend) the pending entries for one workflow step.
    ///
    /// Re-registering the same material while it is still pending
    /// updates the requested quantity; an already deducted entry is
    /// left untouched.
    pub fn register_entries(
        &self,
        workflow_id: &str,
        step_id: &str,
        entries: &[PendingUsageEntry],
    ) -> RepositoryResult<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO pending_deduction_entry (
                    workflow_id, step_id, material_id, quantity, unit,
                    automatic_deduction, deducted, confirmed_by, confirmed_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, NULL)
                ON CONFLICT(workflow_id, step_id, material_id) DO UPDATE SET
                    quantity = excluded.quantity,
                    unit = excluded.unit
                WHERE pending_deduction_entry.deducted = 0
                "#,
            )?;
            for entry in entries {
                stmt.execute(params![
                    workflow_id,
                    step_id,
                    entry.material_id,
                    entry.quantity,
                    entry.unit,
                    entry.automatic_deduction as i32,
                ])?;
                count += 1;
            }
        }
        tx.commit()?;
        Ok(count)
    }

    /// All entries for a step, deducted or not
    pub fn find_by_step(
        &self,
        workflow_id: &str,
        step_id: &str,
    ) -> RepositoryResult<Option<PendingDeduction>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT material_id, quantity, unit, automatic_deduction,
                   deducted, confirmed_by, confirmed_at
            FROM pending_deduction_entry
            WHERE workflow_id = ?1 AND step_id = ?2
            ORDER BY material_id
            "#,
        )?;
        let rows = stmt.query_map(params![workflow_id, step_id], Self::map_row_to_entry)?;
        let entries = rows.collect::<SqliteResult<Vec<_>>>()?;

        if entries.is_empty() {
            return Ok(None);
        }
        Ok(Some(PendingDeduction {
            workflow_id: workflow_id.to_string(),
            step_id: step_id.to_string(),
            entries,
        }))
    }

    /// One entry, if present
    pub fn find_entry(
        &self,
        workflow_id: &str,
        step_id: &str,
        material_id: &str,
    ) -> RepositoryResult<Option<PendingUsageEntry>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            r#"
            SELECT material_id, quantity, unit, automatic_deduction,
                   deducted, confirmed_by, confirmed_at
            FROM pending_deduction_entry
            WHERE workflow_id = ?1 AND step_id = ?2 AND material_id = ?3
            "#,
            params![workflow_id, step_id, material_id],
            Self::map_row_to_entry,
        );
        match result {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Flip an entry to deducted, recording confirmer and timestamp.
    ///
    /// Fails NotFound when the entry does not exist or was already
    /// deducted -- the at-most-once guarantee for confirmations.
    pub fn mark_deducted(
        &self,
        workflow_id: &str,
        step_id: &str,
        material_id: &str,
        confirmed_by: &str,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let n = conn.execute(
            r#"
            UPDATE pending_deduction_entry
            SET deducted = 1, confirmed_by = ?4, confirmed_at = ?5
            WHERE workflow_id = ?1 AND step_id = ?2 AND material_id = ?3
              AND deducted = 0
            "#,
            params![
                workflow_id,
                step_id,
                material_id,
                confirmed_by,
                Utc::now().to_rfc3339(),
            ],
        )?;
        if n == 0 {
            return Err(RepositoryError::not_found(
                "PendingUsageEntry",
                &format!("{}/{}/{}", workflow_id, step_id, material_id),
            ));
        }
        Ok(())
    }

    /// Undo a claim made by mark_deducted when the ledger movement
    /// could not be applied
    pub fn release_claim(
        &self,
        workflow_id: &str,
        step_id: &str,
        material_id: &str,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let n = conn.execute(
            r#"
            UPDATE pending_deduction_entry
            SET deducted = 0, confirmed_by = NULL, confirmed_at = NULL
            WHERE workflow_id = ?1 AND step_id = ?2 AND material_id = ?3
              AND deducted = 1
            "#,
            params![workflow_id, step_id, material_id],
        )?;
        if n == 0 {
            return Err(RepositoryError::not_found(
                "PendingUsageEntry",
                &format!("{}/{}/{}", workflow_id, step_id, material_id),
            ));
        }
        Ok(())
    }

    /// Steps that still have at least one unconfirmed entry
    pub fn list_outstanding(&self) -> RepositoryResult<Vec<PendingDeduction>> {
        let keys = {
            let conn = self.get_conn()?;
            let mut stmt = conn.prepare(
                r#"
                SELECT DISTINCT workflow_id, step_id
                FROM pending_deduction_entry
                WHERE deducted = 0
                ORDER BY workflow_id, step_id
                "#,
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            rows.collect::<SqliteResult<Vec<_>>>()?
        };

        let mut out = Vec::with_capacity(keys.len());
        for (workflow_id, step_id) in keys {
            if let Some(pending) = self.find_by_step(&workflow_id, &step_id)? {
                out.push(pending);
            }
        }
        Ok(out)
    }

    fn map_row_to_entry(row: &rusqlite::Row) -> SqliteResult<PendingUsageEntry> {
        Ok(PendingUsageEntry {
            material_id: row.get(0)?,
            quantity: row.get(1)?,
            unit: row.get(2)?,
            automatic_deduction: row.get::<_, i32>(3)? != 0,
            deducted: row.get::<_, i32>(4)? != 0,
            confirmed_by: row.get(5)?,
            confirmed_at: row
                .get::<_, Option<String>>(6)?
                .and_then(|s| s.parse::<DateTime<Utc>>().ok()),
        })
    }
}
