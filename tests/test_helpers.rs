// ==========================================
// Test helpers
// ==========================================
// Temp database setup and shared fixtures for the integration tests.
// ==========================================

#![allow(dead_code)]

use std::error::Error;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tempfile::NamedTempFile;

use dental_lab_flow::catalog::TemplateCatalog;
use dental_lab_flow::db::{configure_sqlite_connection, init_schema};
use dental_lab_flow::domain::inventory::NewInventoryItem;
use dental_lab_flow::engine::material_broker::MaterialUsageBroker;
use dental_lab_flow::engine::workflow_engine::WorkflowEngine;
use dental_lab_flow::repository::inventory_repo::InventoryRepository;
use dental_lab_flow::repository::pending_repo::PendingDeductionRepository;
use dental_lab_flow::repository::workflow_repo::WorkflowRepository;

/// Temp database with the full schema applied.
///
/// The NamedTempFile must stay alive for the duration of the test.
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    dental_lab_flow::logging::init_test();

    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let conn = Connection::open(&db_path)?;
    configure_sqlite_connection(&conn)?;
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// Open an extra connection to an existing test database
pub fn open_test_connection(db_path: &str) -> Result<Arc<Mutex<Connection>>, Box<dyn Error>> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// One shared connection with every store wired over it
pub struct TestContext {
    pub inventory_repo: Arc<InventoryRepository>,
    pub pending_repo: Arc<PendingDeductionRepository>,
    pub workflow_repo: Arc<WorkflowRepository>,
    pub broker: Arc<MaterialUsageBroker>,
    pub engine: Arc<WorkflowEngine>,
}

pub fn build_context(db_path: &str) -> TestContext {
    let conn = open_test_connection(db_path).unwrap();
    let inventory_repo = Arc::new(InventoryRepository::from_connection(conn.clone()));
    let pending_repo = Arc::new(PendingDeductionRepository::from_connection(conn.clone()));
    let workflow_repo = Arc::new(WorkflowRepository::from_connection(conn));
    let broker = Arc::new(MaterialUsageBroker::new(
        inventory_repo.clone(),
        pending_repo.clone(),
    ));
    let engine = Arc::new(WorkflowEngine::new(
        workflow_repo.clone(),
        Arc::new(TemplateCatalog::with_defaults()),
        broker.clone(),
    ));
    TestContext {
        inventory_repo,
        pending_repo,
        workflow_repo,
        broker,
        engine,
    }
}

/// Seed one inventory item, returning its id
pub fn seed_item(
    repo: &InventoryRepository,
    name: &str,
    initial: f64,
    minimum: f64,
) -> String {
    let item = repo
        .insert_item(
            &NewInventoryItem {
                name: name.to_string(),
                category: "acrylic".to_string(),
                initial_quantity: initial,
                minimum_quantity: minimum,
                unit: "g".to_string(),
                unit_price: 0.5,
            },
            "tester",
        )
        .unwrap();
    item.id
}
