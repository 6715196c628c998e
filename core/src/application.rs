//! Durable application records - the queryable outcome of each claim.
//!
//! At most one [`ApplicationRecord`] exists per identity, enforced by a
//! uniqueness constraint that doubles as the idempotency mechanism for
//! duplicate message delivery. Records are terminal and immutable: created
//! only by the outcome consumer on first successful processing, never
//! updated or deleted afterward.

use crate::outcome::Decision;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Final status of a claim, as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    /// The claim was granted and the gift is allocated.
    Success,
    /// The claim was rejected (stock exhausted).
    Failure,
}

impl ApplicationStatus {
    /// Convert status to its database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }

    /// Parse status from its database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationStoreError::Database`] if the string doesn't
    /// match a known status.
    pub fn parse(s: &str) -> Result<Self, ApplicationStoreError> {
        match s {
            "SUCCESS" => Ok(Self::Success),
            "FAILURE" => Ok(Self::Failure),
            _ => Err(ApplicationStoreError::Database(format!(
                "invalid application status: {s}"
            ))),
        }
    }
}

impl From<Decision> for ApplicationStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Granted => Self::Success,
            Decision::Rejected => Self::Failure,
        }
    }
}

/// A durable, immutable record of a claim's final outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    /// Verified identity of the requester (unique key).
    pub identity: String,
    /// Final claim status.
    pub status: ApplicationStatus,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

/// Errors from the application record store.
#[derive(Error, Debug, Clone)]
pub enum ApplicationStoreError {
    /// A record already exists for this identity.
    ///
    /// Raised by the uniqueness constraint when two deliveries race past the
    /// duplicate check; the consumer treats it as a transient fault and the
    /// retry resolves as a duplicate skip.
    #[error("application already recorded for '{0}'")]
    Duplicate(String),

    /// The backing database failed.
    #[error("application store error: {0}")]
    Database(String),
}

/// Durable, uniquely-keyed storage of final claim outcomes.
///
/// Only the outcome consumer writes here; the read path queries by identity.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Whether a record already exists for `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationStoreError::Database`] on backend failure.
    async fn exists(&self, identity: &str) -> Result<bool, ApplicationStoreError>;

    /// Insert the terminal record for `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationStoreError::Duplicate`] if a record already
    /// exists (uniqueness constraint) and
    /// [`ApplicationStoreError::Database`] on backend failure.
    async fn insert(
        &self,
        identity: &str,
        status: ApplicationStatus,
    ) -> Result<(), ApplicationStoreError>;

    /// Look up the record for `identity`.
    ///
    /// `None` means "pending or never submitted" - the claim may still be in
    /// flight asynchronously, so callers must not treat it as a failure.
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationStoreError::Database`] on backend failure.
    async fn find(&self, identity: &str) -> Result<Option<ApplicationRecord>, ApplicationStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [ApplicationStatus::Success, ApplicationStatus::Failure] {
            let parsed = ApplicationStatus::parse(status.as_str());
            assert_eq!(parsed.ok(), Some(status));
        }
    }

    #[test]
    fn status_invalid() {
        assert!(ApplicationStatus::parse("PENDING").is_err());
    }

    #[test]
    fn status_from_decision() {
        assert_eq!(
            ApplicationStatus::from(Decision::Granted),
            ApplicationStatus::Success
        );
        assert_eq!(
            ApplicationStatus::from(Decision::Rejected),
            ApplicationStatus::Failure
        );
    }
}
