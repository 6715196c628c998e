//! `PostgreSQL` persistence for the Farewell pipeline.
//!
//! Two stores live here:
//!
//! - [`PgApplicationStore`] - the durable, uniquely-keyed record of final
//!   claim outcomes. The unique constraint on `identity` is the idempotency
//!   mechanism for at-least-once message delivery.
//! - [`PgDeadLetterSink`] - persistent storage for outcomes that exhausted
//!   their retries, enabling incident investigation and manual reprocessing.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE applications (
//!     id BIGSERIAL PRIMARY KEY,
//!     identity TEXT NOT NULL UNIQUE,
//!     status TEXT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//!
//! CREATE TABLE failed_outcomes (
//!     id BIGSERIAL PRIMARY KEY,
//!     identity TEXT NOT NULL,
//!     decision TEXT NOT NULL,
//!     retry_count INT NOT NULL,
//!     error_message TEXT NOT NULL,
//!     first_failed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     last_failed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     status TEXT NOT NULL DEFAULT 'pending',
//!     resolved_at TIMESTAMPTZ,
//!     resolved_by TEXT,
//!     resolution_notes TEXT
//! );
//! ```
//!
//! [`ensure_schema`] creates both tables idempotently at startup.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod dead_letter;
mod store;

pub use dead_letter::{DlqStatus, FailedOutcome, PgDeadLetterSink};
pub use store::PgApplicationStore;

use farewell_core::application::ApplicationStoreError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Connect a pool with the given connection limit.
///
/// # Errors
///
/// Returns [`ApplicationStoreError::Database`] if the connection fails.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, ApplicationStoreError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .map_err(|e| ApplicationStoreError::Database(format!("failed to connect: {e}")))
}

/// Create the `applications` and `failed_outcomes` tables if absent.
///
/// # Errors
///
/// Returns [`ApplicationStoreError::Database`] if the DDL fails.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), ApplicationStoreError> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS applications (
            id BIGSERIAL PRIMARY KEY,
            identity TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
    )
    .execute(pool)
    .await
    .map_err(|e| ApplicationStoreError::Database(e.to_string()))?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS failed_outcomes (
            id BIGSERIAL PRIMARY KEY,
            identity TEXT NOT NULL,
            decision TEXT NOT NULL,
            retry_count INT NOT NULL,
            error_message TEXT NOT NULL,
            first_failed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            last_failed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            status TEXT NOT NULL DEFAULT 'pending',
            resolved_at TIMESTAMPTZ,
            resolved_by TEXT,
            resolution_notes TEXT
        )
        ",
    )
    .execute(pool)
    .await
    .map_err(|e| ApplicationStoreError::Database(e.to_string()))?;

    tracing::info!("application schema ensured");
    Ok(())
}
