// ==========================================
// Dental Lab Flow - Configuration Manager
// ==========================================
// Operational settings live in the config_kv table (key-value,
// global scope). Typed getters fall back to the compiled defaults
// when a key is absent.
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::db::open_sqlite_connection;
use crate::engine::schedule::{NORMAL_BUSINESS_DAYS, URGENT_BUSINESS_DAYS};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration lock acquisition failed: {0}")]
    LockError(String),

    #[error("configuration query failed: {0}")]
    QueryError(#[from] rusqlite::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("configuration store unavailable: {0}")]
    StoreError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

pub const KEY_URGENT_LEAD_DAYS: &str = "schedule/urgent_lead_days";
pub const KEY_STANDARD_LEAD_DAYS: &str = "schedule/standard_lead_days";
pub const KEY_TEMPLATES_FILE: &str = "catalog/templates_file";

// ==========================================
// ConfigManager
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn =
            open_sqlite_connection(db_path).map_err(|e| ConfigError::StoreError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ConfigError::LockError(e.to_string()))?;
        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ConfigError::LockError(e.to_string()))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn get_u32(&self, key: &str, default: u32) -> ConfigResult<u32> {
        match self.get_value(key)? {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<u32>().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
        }
    }

    /// Business days to delivery for urgent orders
    pub fn urgent_lead_days(&self) -> ConfigResult<u32> {
        self.get_u32(KEY_URGENT_LEAD_DAYS, URGENT_BUSINESS_DAYS)
    }

    /// Business days to delivery for standard orders
    pub fn standard_lead_days(&self) -> ConfigResult<u32> {
        self.get_u32(KEY_STANDARD_LEAD_DAYS, NORMAL_BUSINESS_DAYS)
    }

    /// Path of a JSON file overriding the compiled-in templates
    pub fn templates_file(&self) -> ConfigResult<Option<String>> {
        self.get_value(KEY_TEMPLATES_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn lead_days_fall_back_to_defaults() {
        let mgr = manager();
        assert_eq!(mgr.urgent_lead_days().unwrap(), URGENT_BUSINESS_DAYS);
        assert_eq!(mgr.standard_lead_days().unwrap(), NORMAL_BUSINESS_DAYS);
    }

    #[test]
    fn set_value_overrides_and_upserts() {
        let mgr = manager();
        mgr.set_value(KEY_URGENT_LEAD_DAYS, "2").unwrap();
        assert_eq!(mgr.urgent_lead_days().unwrap(), 2);
        mgr.set_value(KEY_URGENT_LEAD_DAYS, "4").unwrap();
        assert_eq!(mgr.urgent_lead_days().unwrap(), 4);
    }

    #[test]
    fn invalid_numeric_value_is_rejected() {
        let mgr = manager();
        mgr.set_value(KEY_STANDARD_LEAD_DAYS, "soon").unwrap();
        assert!(matches!(
            mgr.standard_lead_days(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
