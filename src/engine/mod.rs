// ==========================================
// Dental Lab Flow - Engine Layer
// ==========================================
// Business logic on top of the repositories: the workflow state
// machine, material usage settlement and the scheduling rules.
// ==========================================

pub mod events;
pub mod material_broker;
pub mod schedule;
pub mod workflow_engine;

pub use events::{
    NoOpNotificationChannel, NoOpReceivableCreator, Notification, NotificationChannel,
    NotificationSeverity, Notifier, ReceivableCreator, ReceivableRequest,
};
pub use material_broker::{
    MaterialUsageBroker, SettlementFailure, StockCheck, StockShortage, UsageSettlement,
};
pub use workflow_engine::{AdvanceOutcome, WorkflowEngine, WorkflowError, WorkflowResult};
