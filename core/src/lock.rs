//! Per-identity admission lock.
//!
//! A lease-based distributed mutual-exclusion primitive keyed by requester
//! identity. Its sole purpose is to collapse duplicate concurrent submissions
//! from one identity into a single admission attempt - it does not protect
//! the counter, which is independently race-safe.
//!
//! The lease is deliberately short: the protected critical section is one
//! atomic decrement. If the holder stalls past the lease the lock expires,
//! which may admit a second concurrent attempt; that is acceptable because
//! the decrement itself remains linearizable.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Opaque fencing token proving lock ownership at release time.
///
/// Implementations compare the stored token before deleting, so a stale
/// holder whose lease already expired can never release a lock taken over
/// by another caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    /// Wrap a backend-generated token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Errors from the lock backend.
#[derive(Error, Debug, Clone)]
pub enum LockError {
    /// The coordination backend could not be reached or rejected the command.
    #[error("lock backend error: {0}")]
    Backend(String),
}

/// Lease-based mutual exclusion across all processes for a given key.
#[async_trait]
pub trait AdmissionLock: Send + Sync {
    /// Try to acquire the lock, waiting up to `wait`.
    ///
    /// On success the lock is held for at most `lease` and auto-expires if
    /// the holder crashes before releasing. Returns `None` when the lock
    /// could not be obtained within `wait`; callers must treat that as
    /// "already being processed" and fail fast rather than block.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Backend`] on coordination-store failure.
    async fn acquire(
        &self,
        key: &str,
        wait: Duration,
        lease: Duration,
    ) -> Result<Option<LockToken>, LockError>;

    /// Release the lock if still held by the owner of `token`.
    ///
    /// Releasing an already-expired lock is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Backend`] on coordination-store failure.
    async fn release(&self, key: &str, token: &LockToken) -> Result<(), LockError>;
}
