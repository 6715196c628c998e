//! Dead-letter sink for outcomes that exhausted all retry attempts.
//!
//! Processing never silently drops data: once the attempt ceiling is
//! reached, the message is routed here exactly once and logged as requiring
//! operator attention.

use crate::outcome::AdmissionOutcome;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from the dead-letter backing store.
#[derive(Error, Debug, Clone)]
pub enum DeadLetterError {
    /// The backing store failed to record the entry.
    #[error("dead letter store error: {0}")]
    Storage(String),
}

/// Terminal holding destination for outcomes that could not be processed.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Record a terminally failed outcome with its failure metadata.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the entry could not be
    /// persisted; the caller can only log at that point.
    async fn add_entry(
        &self,
        outcome: &AdmissionOutcome,
        error_message: &str,
        retry_count: u32,
    ) -> Result<(), DeadLetterError>;
}
