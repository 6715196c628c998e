//! Notification collaborator boundary.
//!
//! Invoked by the outcome consumer on granted claims, strictly after
//! persistence. Delivery failures are logged and never roll back the
//! record or re-enqueue the outcome message.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the notification transport.
#[derive(Error, Debug, Clone)]
pub enum NotifyError {
    /// The notification could not be delivered.
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Outbound confirmation notification for granted claims.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Send the confirmation notification for `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Delivery`] on transport failure; callers log
    /// and move on.
    async fn notify(&self, identity: &str) -> Result<(), NotifyError>;
}
