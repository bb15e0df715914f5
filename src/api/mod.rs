// ==========================================
// Dental Lab Flow - API Layer
// ==========================================

pub mod error;
pub mod inventory_api;
pub mod workflow_api;

pub use error::{ApiError, ApiResult};
pub use inventory_api::InventoryApi;
pub use workflow_api::{DeliveryOutcome, WorkflowApi};
