// ==========================================
// Dental Lab Flow - Main Entry
// ==========================================
// Opens (or creates) the laboratory database, wires the application
// state and reports readiness. The workflow and inventory APIs are
// driven by the embedding application or by tests.
// ==========================================

use dental_lab_flow::app::{get_default_db_path, AppState};
use dental_lab_flow::{logging, APP_NAME, DB_VERSION, VERSION};

fn main() {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{} v{}", APP_NAME, VERSION);
    tracing::info!("==================================================");

    let db_path = get_default_db_path();
    tracing::info!("using database: {}", db_path);

    let state = match AppState::new(db_path) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    let active = state
        .inventory_api
        .list_items(true)
        .map(|items| items.len())
        .unwrap_or(0);
    tracing::info!(
        schema_version = DB_VERSION,
        active_inventory_items = active,
        "ready"
    );
}
