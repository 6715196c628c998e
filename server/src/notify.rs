//! Confirmation notification delivery.
//!
//! The pipeline only needs a delivery seam; the concrete transport (email,
//! SMS) is deployment-specific. [`LogNotificationSender`] records the
//! confirmation in the structured log, which is sufficient for environments
//! without an outbound mail relay.

use async_trait::async_trait;
use farewell_core::notify::{NotificationSender, NotifyError};
use tracing::info;

/// Notification sender that emits a structured log line per confirmation.
#[derive(Debug, Clone, Default)]
pub struct LogNotificationSender;

#[async_trait]
impl NotificationSender for LogNotificationSender {
    async fn notify(&self, identity: &str) -> Result<(), NotifyError> {
        info!(identity, "claim confirmation notification sent");
        metrics::counter!("notifications.sent").increment(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_sender_never_fails() {
        let sender = LogNotificationSender;
        assert!(sender.notify("user@example.com").await.is_ok());
    }
}
