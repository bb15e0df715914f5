// ==========================================
// Dental Lab Flow - Repository Layer
// ==========================================
// SQLite-backed persistence behind Arc<Mutex<Connection>>.
// The movement log and workflow history are append-only.
// ==========================================

pub mod error;
pub mod inventory_repo;
pub mod pending_repo;
pub mod workflow_repo;

pub use error::{RepositoryError, RepositoryResult};
pub use inventory_repo::{InventoryRepository, MovementOutcome};
pub use pending_repo::PendingDeductionRepository;
pub use workflow_repo::WorkflowRepository;
