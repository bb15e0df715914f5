// ==========================================
// Dental Lab Flow - SQLite Connection Setup
// ==========================================
// Goals:
// - single place for Connection::open PRAGMA behavior, so every
//   module gets foreign keys and the same busy_timeout
// - embedded schema initialization for fresh databases
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// Default busy_timeout (milliseconds)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Schema version expected by the current code
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// Apply the unified PRAGMA set to a connection.
///
/// foreign_keys and busy_timeout are per-connection settings and must
/// be applied to every connection, not once per database.
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// Open a SQLite connection with the unified configuration applied
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// Read the stored schema version (None if the table does not exist)
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// Create all tables if they do not exist and record the schema version.
///
/// Idempotent; safe to call on every startup and in every test.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS workflow_instance (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL,
            template_id TEXT NOT NULL,
            name TEXT NOT NULL,
            current_step_index INTEGER NOT NULL,
            status TEXT NOT NULL,
            is_urgent INTEGER NOT NULL DEFAULT 0,
            started_at TEXT NOT NULL,
            estimated_delivery TEXT NOT NULL,
            actual_delivery TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS workflow_step (
            id TEXT PRIMARY KEY,
            workflow_id TEXT NOT NULL REFERENCES workflow_instance(id) ON DELETE CASCADE,
            seq_no INTEGER NOT NULL,
            step_type TEXT NOT NULL,
            status TEXT NOT NULL,
            assigned_to TEXT,
            started_at TEXT,
            completed_at TEXT,
            notes TEXT,
            materials_used_json TEXT NOT NULL DEFAULT '[]',
            UNIQUE(workflow_id, seq_no)
        );

        CREATE TABLE IF NOT EXISTS workflow_history (
            id TEXT PRIMARY KEY,
            workflow_id TEXT NOT NULL REFERENCES workflow_instance(id) ON DELETE CASCADE,
            timestamp TEXT NOT NULL,
            action TEXT NOT NULL,
            description TEXT NOT NULL,
            actor TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_workflow_history_workflow
            ON workflow_history(workflow_id, timestamp);

        CREATE TABLE IF NOT EXISTS inventory_item (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            current_quantity REAL NOT NULL CHECK (current_quantity >= 0),
            minimum_quantity REAL NOT NULL,
            unit TEXT NOT NULL,
            unit_price REAL NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS inventory_movement (
            id TEXT PRIMARY KEY,
            material_id TEXT NOT NULL REFERENCES inventory_item(id),
            quantity REAL NOT NULL,
            movement_type TEXT NOT NULL,
            date TEXT NOT NULL,
            user_id TEXT NOT NULL,
            order_id TEXT,
            workflow_step_id TEXT,
            automatic_deduction INTEGER NOT NULL DEFAULT 0,
            confirmed INTEGER NOT NULL DEFAULT 0,
            notes TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_inventory_movement_material
            ON inventory_movement(material_id, date);

        CREATE TABLE IF NOT EXISTS inventory_alert (
            id TEXT PRIMARY KEY,
            material_id TEXT NOT NULL REFERENCES inventory_item(id),
            alert_type TEXT NOT NULL,
            message TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            is_read INTEGER NOT NULL DEFAULT 0,
            is_resolved INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS pending_deduction_entry (
            workflow_id TEXT NOT NULL,
            step_id TEXT NOT NULL,
            material_id TEXT NOT NULL,
            quantity REAL NOT NULL,
            unit TEXT NOT NULL,
            automatic_deduction INTEGER NOT NULL DEFAULT 0,
            deducted INTEGER NOT NULL DEFAULT 0,
            confirmed_by TEXT,
            confirmed_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (workflow_id, step_id, material_id)
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (scope_id, key)
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(
            read_schema_version(&conn).unwrap(),
            Some(CURRENT_SCHEMA_VERSION)
        );
    }
}
