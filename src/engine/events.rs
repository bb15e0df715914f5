// ==========================================
// Dental Lab Flow - Collaborator Interfaces
// ==========================================
// The core emits two kinds of outbound calls: user-facing
// notifications and create-receivable requests on delivery.
// Both are defined as traits here and implemented outside the core;
// the no-op implementations serve tests and standalone runs.
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// Notifications (fire-and-forget)
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationSeverity {
    Info,
    Warning,
    Critical,
}

impl NotificationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationSeverity::Info => "INFO",
            NotificationSeverity::Warning => "WARNING",
            NotificationSeverity::Critical => "CRITICAL",
        }
    }
}

/// A user-facing message emitted by the core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    pub severity: NotificationSeverity,
}

impl Notification {
    pub fn new(message: impl Into<String>, severity: NotificationSeverity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

/// Notification channel collaborator.
///
/// Implemented outside the core (messaging, e-mail, in-app inbox).
/// The core never requires an acknowledgement.
pub trait NotificationChannel: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// No-op channel for tests and standalone runs
#[derive(Debug, Clone, Default)]
pub struct NoOpNotificationChannel;

impl NotificationChannel for NoOpNotificationChannel {
    fn notify(&self, notification: Notification) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            severity = notification.severity.as_str(),
            "NoOpNotificationChannel: dropping notification: {}",
            notification.message
        );
        Ok(())
    }
}

/// Optional wrapper: fire-and-forget dispatch that logs and swallows
/// channel failures so they can never fail a core operation.
#[derive(Clone)]
pub struct Notifier {
    inner: Option<Arc<dyn NotificationChannel>>,
}

impl Notifier {
    pub fn with_channel(channel: Arc<dyn NotificationChannel>) -> Self {
        Self {
            inner: Some(channel),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }

    /// Send if configured. Channel errors are logged, never propagated.
    pub fn send(&self, notification: Notification) {
        if let Some(channel) = &self.inner {
            if let Err(e) = channel.notify(notification) {
                tracing::warn!("notification channel failed: {}", e);
            }
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::none()
    }
}

// ==========================================
// Receivable creation (financial collaborator)
// ==========================================

/// Request emitted when an order reaches delivered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivableRequest {
    pub order_client: String,
    pub amount: f64,
    pub due_date: NaiveDate,
    pub related_order_id: String,
}

/// Financial collaborator creating a receivable for a delivered order
pub trait ReceivableCreator: Send + Sync {
    /// Returns the collaborator-side receivable id
    fn create(&self, request: ReceivableRequest) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// No-op creator for tests and standalone runs
#[derive(Debug, Clone, Default)]
pub struct NoOpReceivableCreator;

impl ReceivableCreator for NoOpReceivableCreator {
    fn create(&self, request: ReceivableRequest) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            order_id = %request.related_order_id,
            amount = request.amount,
            "NoOpReceivableCreator: dropping receivable request"
        );
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notifier_none_is_silent() {
        let notifier = Notifier::none();
        assert!(!notifier.is_configured());
        notifier.send(Notification::new("ignored", NotificationSeverity::Info));
    }

    #[test]
    fn test_noop_channel_accepts() {
        let channel = NoOpNotificationChannel;
        let result = channel.notify(Notification::new("hello", NotificationSeverity::Warning));
        assert!(result.is_ok());
    }

    #[test]
    fn test_noop_receivable_creator() {
        let creator = NoOpReceivableCreator;
        let request = ReceivableRequest {
            order_client: "C1".to_string(),
            amount: 420.0,
            due_date: chrono::NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
            related_order_id: "O1".to_string(),
        };
        assert!(creator.create(request).is_ok());
    }
}
