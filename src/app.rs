// ==========================================
// Dental Lab Flow - Application State
// ==========================================
// Composition root: opens the database, wires repositories, engines
// and APIs over one shared connection, and exposes the API instances
// the embedding application calls.
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::api::{InventoryApi, WorkflowApi};
use crate::catalog::TemplateCatalog;
use crate::config::ConfigManager;
use crate::db::{configure_sqlite_connection, init_schema};
use crate::engine::events::{NotificationChannel, Notifier, ReceivableCreator};
use crate::engine::material_broker::MaterialUsageBroker;
use crate::engine::workflow_engine::WorkflowEngine;
use crate::repository::inventory_repo::InventoryRepository;
use crate::repository::pending_repo::PendingDeductionRepository;
use crate::repository::workflow_repo::WorkflowRepository;

/// Optional external collaborators supplied by the embedding
/// application. Everything defaults to disabled.
#[derive(Default)]
pub struct Collaborators {
    pub notification_channel: Option<Arc<dyn NotificationChannel>>,
    pub receivable_creator: Option<Arc<dyn ReceivableCreator>>,
}

pub struct AppState {
    pub db_path: String,
    pub workflow_api: Arc<WorkflowApi>,
    pub inventory_api: Arc<InventoryApi>,
    pub config_manager: Arc<ConfigManager>,
}

impl AppState {
    pub fn new(db_path: String) -> Result<Self, String> {
        Self::with_collaborators(db_path, Collaborators::default())
    }

    pub fn with_collaborators(
        db_path: String,
        collaborators: Collaborators,
    ) -> Result<Self, String> {
        tracing::info!("initializing AppState, database: {}", db_path);

        let conn = Connection::open(&db_path).map_err(|e| format!("cannot open database: {}", e))?;
        configure_sqlite_connection(&conn)
            .map_err(|e| format!("cannot configure database: {}", e))?;
        init_schema(&conn).map_err(|e| format!("cannot initialize schema: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        let inventory_repo = Arc::new(InventoryRepository::from_connection(conn.clone()));
        let pending_repo = Arc::new(PendingDeductionRepository::from_connection(conn.clone()));
        let workflow_repo = Arc::new(WorkflowRepository::from_connection(conn.clone()));
        let config_manager = Arc::new(ConfigManager::from_connection(conn.clone()));

        let catalog = match config_manager
            .templates_file()
            .map_err(|e| format!("cannot read catalog configuration: {}", e))?
        {
            Some(path) => Arc::new(
                TemplateCatalog::load_from_file(std::path::Path::new(&path))
                    .map_err(|e| format!("cannot load templates from {}: {}", path, e))?,
            ),
            None => Arc::new(TemplateCatalog::with_defaults()),
        };

        let urgent_days = config_manager
            .urgent_lead_days()
            .map_err(|e| format!("cannot read lead time configuration: {}", e))?;
        let standard_days = config_manager
            .standard_lead_days()
            .map_err(|e| format!("cannot read lead time configuration: {}", e))?;

        let broker = Arc::new(MaterialUsageBroker::new(
            inventory_repo.clone(),
            pending_repo.clone(),
        ));
        let engine = Arc::new(
            WorkflowEngine::new(workflow_repo.clone(), catalog, broker.clone())
                .with_lead_days(urgent_days, standard_days),
        );

        let notifier = match collaborators.notification_channel {
            Some(channel) => Notifier::with_channel(channel),
            None => Notifier::none(),
        };

        let mut workflow_api = WorkflowApi::new(engine, broker.clone(), workflow_repo)
            .with_notifier(notifier.clone());
        if let Some(creator) = collaborators.receivable_creator {
            workflow_api = workflow_api.with_receivable_creator(creator);
        }

        let inventory_api =
            InventoryApi::new(inventory_repo, broker).with_notifier(notifier);

        tracing::info!("AppState initialized");
        Ok(Self {
            db_path,
            workflow_api: Arc::new(workflow_api),
            inventory_api: Arc::new(inventory_api),
            config_manager,
        })
    }
}

/// Database location: env override first, then the user data dir,
/// falling back to the working directory.
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("DENTAL_LAB_FLOW_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./dental_lab_flow.db");

    if let Some(data_dir) = dirs::data_dir() {
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("dental-lab-flow-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("dental-lab-flow");
        }

        if let Err(e) = std::fs::create_dir_all(&path) {
            tracing::warn!("cannot create data directory {:?}: {}", path, e);
            return "./dental_lab_flow.db".to_string();
        }
        path = path.join("dental_lab_flow.db");
    }

    path.to_string_lossy().to_string()
}
