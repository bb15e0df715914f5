// ==========================================
// Dental Lab Flow - Core Library
// ==========================================
// Production workflow and material management for a dental
// prosthetics laboratory: per-order step workflows, an auditable
// inventory ledger, and the deduction broker between them.
// Stack: Rust + SQLite
// ==========================================

// ==========================================
// Module declarations
// ==========================================

// Domain layer - entities and types
pub mod domain;

// Repository layer - data access
pub mod repository;

// Engine layer - business rules
pub mod engine;

// Template catalog - workflow blueprints
pub mod catalog;

// Configuration layer
pub mod config;

// Database infrastructure (connection setup, unified PRAGMAs)
pub mod db;

// Logging
pub mod logging;

// API layer - business interfaces
pub mod api;

// Application layer - composition root
pub mod app;

// ==========================================
// Re-exports
// ==========================================

// Domain types
pub use domain::types::{
    AlertType, HistoryAction, MovementType, ProcedureType, StepStatus, WorkflowStatus,
};

// Domain entities
pub use domain::{
    InventoryAlert, InventoryItem, InventoryMovement, MaterialUsage, MovementContext,
    NewInventoryItem, PendingDeduction, WorkflowHistoryEntry, WorkflowInstance, WorkflowStep,
    WorkflowTemplate,
};

// Engines
pub use engine::{
    AdvanceOutcome, MaterialUsageBroker, UsageSettlement, WorkflowEngine, WorkflowError,
};

// Catalog
pub use catalog::TemplateCatalog;

// API
pub use api::{ApiError, InventoryApi, WorkflowApi};

// Application
pub use app::{get_default_db_path, AppState};

// ==========================================
// Constants
// ==========================================

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "Dental Lab Flow";

/// Database schema version expected by this build
pub const DB_VERSION: i64 = db::CURRENT_SCHEMA_VERSION;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }
}
