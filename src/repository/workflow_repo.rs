// ==========================================
// Dental Lab Flow - Workflow Repository
// ==========================================
// Persists WorkflowInstance as three tables: workflow_instance,
// workflow_step (ordered by seq_no), workflow_history (append-only).
// Saves are all-or-nothing: steps + status + history commit in one
// transaction, so callers never observe a partial write.
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::types::{HistoryAction, StepStatus, WorkflowStatus};
use crate::domain::workflow::{
    MaterialUsage, WorkflowHistoryEntry, WorkflowInstance, WorkflowStep,
};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

// ==========================================
// WorkflowRepository
// ==========================================
pub struct WorkflowRepository {
    conn: Arc<Mutex<Connection>>,
}

impl WorkflowRepository {
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
    // Write path
    // ==========================================

    /// Persist a freshly created instance (steps + initial history)
    pub fn insert_instance(&self, instance: &WorkflowInstance) -> RepositoryResult<()> {
        Self::check_invariant(instance)?;

        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            r#"
            INSERT INTO workflow_instance (
                id, order_id, template_id, name, current_step_index, status,
                is_urgent, started_at, estimated_delivery, actual_delivery,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                instance.id,
                instance.order_id,
                instance.template_id,
                instance.name,
                instance.current_step_index as i64,
                instance.status.as_str(),
                instance.is_urgent as i32,
                instance.started_at.to_rfc3339(),
                instance.estimated_delivery.to_string(),
                instance.actual_delivery.map(|d| d.to_string()),
                instance.created_at.to_rfc3339(),
                instance.updated_at.to_rfc3339(),
            ],
        )?;

        for (seq_no, step) in instance.steps.iter().enumerate() {
            Self::insert_step_tx(&tx, &instance.id, seq_no, step)?;
        }
        for entry in &instance.history {
            Self::insert_history_tx(&tx, &instance.id, entry)?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Persist the whole mutated instance.
    ///
    /// Steps are updated in place (the step set is fixed at creation);
    /// history rows are appended with INSERT OR IGNORE so already stored
    /// entries are never duplicated.
    pub fn save_instance(&self, instance: &WorkflowInstance) -> RepositoryResult<()> {
        Self::check_invariant(instance)?;

        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let n = tx.execute(
            r#"
            UPDATE workflow_instance
            SET current_step_index = ?2, status = ?3, is_urgent = ?4,
                estimated_delivery = ?5, actual_delivery = ?6, updated_at = ?7
            WHERE id = ?1
            "#,
            params![
                instance.id,
                instance.current_step_index as i64,
                instance.status.as_str(),
                instance.is_urgent as i32,
                instance.estimated_delivery.to_string(),
                instance.actual_delivery.map(|d| d.to_string()),
                instance.updated_at.to_rfc3339(),
            ],
        )?;
        if n == 0 {
            return Err(RepositoryError::not_found("WorkflowInstance", &instance.id));
        }

        for step in &instance.steps {
            let materials_json = serde_json::to_string(&step.materials_used)
                .map_err(|e| RepositoryError::InternalError(e.to_string()))?;
            tx.execute(
                r#"
                UPDATE workflow_step
                SET status = ?2, assigned_to = ?3, started_at = ?4,
                    completed_at = ?5, notes = ?6, materials_used_json = ?7
                WHERE id = ?1
                "#,
                params![
                    step.id,
                    step.status.as_str(),
                    step.assigned_to,
                    step.started_at.map(|t| t.to_rfc3339()),
                    step.completed_at.map(|t| t.to_rfc3339()),
                    step.notes,
                    materials_json,
                ],
            )?;
        }

        for entry in &instance.history {
            Self::insert_history_tx(&tx, &instance.id, entry)?;
        }

        tx.commit()?;
        Ok(())
    }

    // ==========================================
    // Read path
    // ==========================================

    pub fn find_by_id(&self, workflow_id: &str) -> RepositoryResult<Option<WorkflowInstance>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, order_id, template_id, name, current_step_index, status,
                   is_urgent, started_at, estimated_delivery, actual_delivery,
                   created_at, updated_at
            FROM workflow_instance
            WHERE id = ?1
            "#,
        )?;

        let header = stmt.query_row(params![workflow_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, i32>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, Option<String>>(9)?,
                row.get::<_, String>(10)?,
                row.get::<_, String>(11)?,
            ))
        });

        let header = match header {
            Ok(h) => h,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let steps = Self::query_steps(&conn, workflow_id)?;
        let history = Self::query_history(&conn, workflow_id)?;

        let status = WorkflowStatus::parse(&header.5).ok_or_else(|| {
            RepositoryError::ValidationError(format!("unknown workflow status: {}", header.5))
        })?;

        Ok(Some(WorkflowInstance {
            id: header.0,
            order_id: header.1,
            template_id: header.2,
            name: header.3,
            current_step_index: header.4 as usize,
            status,
            is_urgent: header.6 != 0,
            started_at: Self::parse_ts(&header.7),
            estimated_delivery: Self::parse_date(&header.8)?,
            actual_delivery: header.9.as_deref().map(Self::parse_date).transpose()?,
            history,
            created_at: Self::parse_ts(&header.10),
            updated_at: Self::parse_ts(&header.11),
            steps,
        }))
    }

    pub fn list_by_status(
        &self,
        status: WorkflowStatus,
    ) -> RepositoryResult<Vec<WorkflowInstance>> {
        let ids = {
            let conn = self.get_conn()?;
            let mut stmt = conn.prepare(
                "SELECT id FROM workflow_instance WHERE status = ?1 ORDER BY created_at",
            )?;
            let rows = stmt.query_map(params![status.as_str()], |row| row.get::<_, String>(0))?;
            rows.collect::<SqliteResult<Vec<_>>>()?
        };

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(instance) = self.find_by_id(&id)? {
                out.push(instance);
            }
        }
        Ok(out)
    }

    pub fn find_by_order(&self, order_id: &str) -> RepositoryResult<Option<WorkflowInstance>> {
        let id = {
            let conn = self.get_conn()?;
            let result = conn.query_row(
                "SELECT id FROM workflow_instance WHERE order_id = ?1 ORDER BY created_at DESC LIMIT 1",
                params![order_id],
                |row| row.get::<_, String>(0),
            );
            match result {
                Ok(id) => id,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        };
        self.find_by_id(&id)
    }

    // ==========================================
    // Helpers
    // ==========================================

    fn check_invariant(instance: &WorkflowInstance) -> RepositoryResult<()> {
        if !instance.invariant_holds() {
            return Err(RepositoryError::ValidationError(format!(
                "workflow {} violates the single in-progress step invariant",
                instance.id
            )));
        }
        Ok(())
    }

    fn insert_step_tx(
        tx: &Connection,
        workflow_id: &str,
        seq_no: usize,
        step: &WorkflowStep,
    ) -> RepositoryResult<()> {
        let materials_json = serde_json::to_string(&step.materials_used)
            .map_err(|e| RepositoryError::InternalError(e.to_string()))?;
        tx.execute(
            r#"
            INSERT INTO workflow_step (
                id, workflow_id, seq_no, step_type, status, assigned_to,
                started_at, completed_at, notes, materials_used_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                step.id,
                workflow_id,
                seq_no as i64,
                step.step_type,
                step.status.as_str(),
                step.assigned_to,
                step.started_at.map(|t| t.to_rfc3339()),
                step.completed_at.map(|t| t.to_rfc3339()),
                step.notes,
                materials_json,
            ],
        )?;
        Ok(())
    }

    fn insert_history_tx(
        tx: &Connection,
        workflow_id: &str,
        entry: &WorkflowHistoryEntry,
    ) -> RepositoryResult<()> {
        tx.execute(
            r#"
            INSERT OR IGNORE INTO workflow_history (
                id, workflow_id, timestamp, action, description, actor
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                entry.id,
                workflow_id,
                entry.timestamp.to_rfc3339(),
                entry.action.as_str(),
                entry.description,
                entry.actor,
            ],
        )?;
        Ok(())
    }

    fn query_steps(conn: &Connection, workflow_id: &str) -> RepositoryResult<Vec<WorkflowStep>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, step_type, status, assigned_to, started_at,
                   completed_at, notes, materials_used_json
            FROM workflow_step
            WHERE workflow_id = ?1
            ORDER BY seq_no
            "#,
        )?;
        let rows = stmt.query_map(params![workflow_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut steps = Vec::new();
        for row in rows {
            let (id, step_type, status, assigned_to, started_at, completed_at, notes, materials) =
                row?;
            let materials_used: Vec<MaterialUsage> = serde_json::from_str(&materials)
                .map_err(|e| RepositoryError::InternalError(e.to_string()))?;
            steps.push(WorkflowStep {
                id,
                step_type,
                status: StepStatus::parse(&status).ok_or_else(|| {
                    RepositoryError::ValidationError(format!("unknown step status: {}", status))
                })?,
                assigned_to,
                started_at: started_at.as_deref().map(Self::parse_ts),
                completed_at: completed_at.as_deref().map(Self::parse_ts),
                notes,
                materials_used,
            });
        }
        Ok(steps)
    }

    fn query_history(
        conn: &Connection,
        workflow_id: &str,
    ) -> RepositoryResult<Vec<WorkflowHistoryEntry>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, timestamp, action, description, actor
            FROM workflow_history
            WHERE workflow_id = ?1
            ORDER BY timestamp, id
            "#,
        )?;
        let rows = stmt.query_map(params![workflow_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut history = Vec::new();
        for row in rows {
            let (id, timestamp, action, description, actor) = row?;
            history.push(WorkflowHistoryEntry {
                id,
                timestamp: Self::parse_ts(&timestamp),
                action: HistoryAction::parse(&action).ok_or_else(|| {
                    RepositoryError::ValidationError(format!("unknown history action: {}", action))
                })?,
                description,
                actor,
            });
        }
        Ok(history)
    }

    fn parse_ts(s: &str) -> DateTime<Utc> {
        s.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now())
    }

    fn parse_date(s: &str) -> RepositoryResult<NaiveDate> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|e| RepositoryError::ValidationError(format!("bad date '{}': {}", s, e)))
    }
}
