//! Dead-letter storage for outcomes that exhausted retries.
//!
//! Provides persistent storage and management of outcome messages that
//! failed processing after all retry attempts. Enables observability,
//! incident response, and manual reprocessing workflows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use farewell_core::dead_letter::{DeadLetterError, DeadLetterSink};
use farewell_core::outcome::AdmissionOutcome;
use sqlx::{PgPool, Row};

/// Status of a dead-lettered outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlqStatus {
    /// Entry is pending investigation/reprocessing.
    Pending,
    /// Entry was successfully reprocessed.
    Resolved,
    /// Entry was permanently discarded (cannot be fixed).
    Discarded,
}

impl DlqStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Discarded => "discarded",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the string doesn't match a
    /// known status.
    pub fn parse(s: &str) -> Result<Self, DeadLetterError> {
        match s {
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "discarded" => Ok(Self::Discarded),
            _ => Err(DeadLetterError::Storage(format!("invalid DLQ status: {s}"))),
        }
    }
}

/// A dead-lettered outcome with its failure metadata.
#[derive(Debug, Clone)]
pub struct FailedOutcome {
    /// Unique identifier for this entry.
    pub id: i64,
    /// Identity the failed outcome belonged to.
    pub identity: String,
    /// Decision carried by the failed message.
    pub decision: String,
    /// Number of processing retries before giving up.
    pub retry_count: i32,
    /// Error message from the final failure.
    pub error_message: String,
    /// When this outcome first failed.
    pub first_failed_at: DateTime<Utc>,
    /// When this outcome most recently failed.
    pub last_failed_at: DateTime<Utc>,
    /// Current lifecycle status.
    pub status: DlqStatus,
    /// When the failure was resolved (if applicable).
    pub resolved_at: Option<DateTime<Utc>>,
    /// Who/what resolved the failure.
    pub resolved_by: Option<String>,
    /// Notes about the resolution.
    pub resolution_notes: Option<String>,
}

/// `PostgreSQL`-backed dead-letter sink.
///
/// # Example
///
/// ```no_run
/// use farewell_postgres::{DlqStatus, PgDeadLetterSink};
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let dlq = PgDeadLetterSink::new(pool);
///
/// let pending = dlq.list_pending(100).await?;
/// println!("pending failures: {}", pending.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PgDeadLetterSink {
    pool: PgPool,
}

impl PgDeadLetterSink {
    /// Create a sink over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// List pending entries, oldest first (FIFO triage).
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the query fails.
    pub async fn list_pending(&self, limit: usize) -> Result<Vec<FailedOutcome>, DeadLetterError> {
        #[allow(clippy::cast_possible_wrap)] // Limit is reasonable size, i64 is safe
        let rows = sqlx::query(
            r"
            SELECT id, identity, decision, retry_count, error_message,
                   first_failed_at, last_failed_at, status,
                   resolved_at, resolved_by, resolution_notes
            FROM failed_outcomes
            WHERE status = 'pending'
            ORDER BY first_failed_at ASC
            LIMIT $1
            ",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DeadLetterError::Storage(e.to_string()))?;

        rows.iter().map(Self::row_to_failed_outcome).collect()
    }

    /// Count of pending entries, for monitoring and health checks.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the query fails.
    pub async fn count_pending(&self) -> Result<i64, DeadLetterError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM failed_outcomes WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| DeadLetterError::Storage(e.to_string()))?;

        Ok(count)
    }

    /// Mark an entry as resolved.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the update fails.
    pub async fn mark_resolved(
        &self,
        id: i64,
        resolved_by: &str,
        notes: Option<&str>,
    ) -> Result<(), DeadLetterError> {
        sqlx::query(
            r"
            UPDATE failed_outcomes
            SET status = 'resolved', resolved_at = NOW(), resolved_by = $1, resolution_notes = $2
            WHERE id = $3
            ",
        )
        .bind(resolved_by)
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| DeadLetterError::Storage(e.to_string()))?;

        tracing::info!(dlq_id = id, resolved_by, "dead-letter entry marked as resolved");
        metrics::counter!("dead_letter.resolved").increment(1);

        Ok(())
    }

    /// Mark an entry as permanently discarded.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the update fails.
    pub async fn mark_discarded(&self, id: i64, reason: &str) -> Result<(), DeadLetterError> {
        sqlx::query(
            r"
            UPDATE failed_outcomes
            SET status = 'discarded', resolved_at = NOW(), resolution_notes = $1
            WHERE id = $2
            ",
        )
        .bind(reason)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| DeadLetterError::Storage(e.to_string()))?;

        tracing::warn!(dlq_id = id, reason, "dead-letter entry marked as discarded");
        metrics::counter!("dead_letter.discarded").increment(1);

        Ok(())
    }

    fn row_to_failed_outcome(row: &sqlx::postgres::PgRow) -> Result<FailedOutcome, DeadLetterError> {
        let status_str: String = row.get("status");

        Ok(FailedOutcome {
            id: row.get("id"),
            identity: row.get("identity"),
            decision: row.get("decision"),
            retry_count: row.get("retry_count"),
            error_message: row.get("error_message"),
            first_failed_at: row.get("first_failed_at"),
            last_failed_at: row.get("last_failed_at"),
            status: DlqStatus::parse(&status_str)?,
            resolved_at: row.get("resolved_at"),
            resolved_by: row.get("resolved_by"),
            resolution_notes: row.get("resolution_notes"),
        })
    }
}

#[async_trait]
impl DeadLetterSink for PgDeadLetterSink {
    async fn add_entry(
        &self,
        outcome: &AdmissionOutcome,
        error_message: &str,
        retry_count: u32,
    ) -> Result<(), DeadLetterError> {
        #[allow(clippy::cast_possible_wrap)] // Retry ceilings are tiny
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO failed_outcomes (identity, decision, retry_count, error_message)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            ",
        )
        .bind(&outcome.identity)
        .bind(outcome.decision.as_str())
        .bind(retry_count as i32)
        .bind(error_message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DeadLetterError::Storage(e.to_string()))?;

        tracing::warn!(
            dlq_id = id,
            identity = %outcome.identity,
            decision = %outcome.decision,
            retry_count,
            error = error_message,
            "outcome added to dead letter queue"
        );
        metrics::counter!("dead_letter.added").increment(1);

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn dlq_status_roundtrip() {
        for status in &[DlqStatus::Pending, DlqStatus::Resolved, DlqStatus::Discarded] {
            let s = status.as_str();
            let parsed = DlqStatus::parse(s).expect("valid status should parse");
            assert_eq!(*status, parsed);
        }
    }

    #[test]
    fn dlq_status_invalid() {
        assert!(DlqStatus::parse("invalid").is_err());
    }
}
