//! Postgres-backed application record store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use farewell_core::application::{
    ApplicationRecord, ApplicationStatus, ApplicationStore, ApplicationStoreError,
};
use sqlx::{PgPool, Row};

/// `PostgreSQL`-backed [`ApplicationStore`].
///
/// Records are terminal and immutable: the store only ever inserts, and the
/// unique constraint on `identity` rejects duplicates so that redelivered
/// outcome messages cannot duplicate their effect.
///
/// # Example
///
/// ```no_run
/// use farewell_postgres::PgApplicationStore;
/// use farewell_core::application::{ApplicationStatus, ApplicationStore};
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let store = PgApplicationStore::new(pool);
///
/// if !store.exists("user@example.com").await? {
///     store.insert("user@example.com", ApplicationStatus::Success).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PgApplicationStore {
    pool: PgPool,
}

impl PgApplicationStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApplicationStore for PgApplicationStore {
    async fn exists(&self, identity: &str) -> Result<bool, ApplicationStoreError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM applications WHERE identity = $1)")
                .bind(identity)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| ApplicationStoreError::Database(e.to_string()))?;

        Ok(exists)
    }

    async fn insert(
        &self,
        identity: &str,
        status: ApplicationStatus,
    ) -> Result<(), ApplicationStoreError> {
        sqlx::query("INSERT INTO applications (identity, status) VALUES ($1, $2)")
            .bind(identity)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if e.as_database_error()
                    .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
                {
                    ApplicationStoreError::Duplicate(identity.to_string())
                } else {
                    ApplicationStoreError::Database(e.to_string())
                }
            })?;

        tracing::info!(identity, status = status.as_str(), "application record inserted");
        metrics::counter!("application_store.inserted", "status" => status.as_str()).increment(1);

        Ok(())
    }

    async fn find(
        &self,
        identity: &str,
    ) -> Result<Option<ApplicationRecord>, ApplicationStoreError> {
        let row = sqlx::query(
            "SELECT identity, status, created_at FROM applications WHERE identity = $1",
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ApplicationStoreError::Database(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status_str: String = row.get("status");
        let created_at: DateTime<Utc> = row.get("created_at");

        Ok(Some(ApplicationRecord {
            identity: row.get("identity"),
            status: ApplicationStatus::parse(&status_str)?,
            created_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<PgApplicationStore>();
        assert_sync::<PgApplicationStore>();
    }
}
