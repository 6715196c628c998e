//! Atomic stock counter abstraction.
//!
//! The counter is the only globally shared mutable resource in the pipeline
//! and is mutated exclusively through [`CounterStore::decrement_with_floor`].
//! No component ever reads-then-writes it directly: the floor check and the
//! compensating increment happen inside a single server-side operation, which
//! converts the classic check-then-act race into one linearizable step.

use async_trait::async_trait;
use thiserror::Error;

/// Sentinel returned by [`CounterStore::decrement_with_floor`] when the
/// stock was already exhausted and the decrement was compensated.
pub const SOLD_OUT: i64 = -1;

/// Errors from the counter backing store.
///
/// Both variants are fatal for the request in progress: without a counter
/// read there is no safe default, since proceeding would allow unbounded
/// over-allocation.
#[derive(Error, Debug, Clone)]
pub enum CounterError {
    /// The counter key has never been initialized by an administrative set.
    #[error("stock counter key '{0}' does not exist")]
    Missing(String),

    /// The backing store could not be reached or rejected the operation.
    #[error("stock counter store unavailable: {0}")]
    Unavailable(String),
}

/// Race-free stock counter operations.
///
/// Implementations must make `decrement_with_floor` a single indivisible
/// server-side operation (a scripted command, a transaction, or an
/// equivalent compare-and-swap loop), never a separate read-then-write.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically decrement the counter, compensating back to the floor.
    ///
    /// Returns the post-decrement value when stock remained (`>= 0`), or
    /// [`SOLD_OUT`] when the decrement went negative and was incremented
    /// back within the same atomic step.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::Missing`] if the key was never initialized
    /// and [`CounterError::Unavailable`] on backend failure.
    async fn decrement_with_floor(&self, key: &str) -> Result<i64, CounterError>;

    /// Administratively reset the counter to an arbitrary non-negative value.
    ///
    /// May be invoked at any time, including concurrently with in-flight
    /// admissions; the new value becomes the base for subsequent decrements.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::Unavailable`] on backend failure.
    async fn set(&self, key: &str, value: i64) -> Result<(), CounterError>;

    /// Read the current counter value.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::Missing`] if the key was never initialized
    /// and [`CounterError::Unavailable`] on backend failure.
    async fn current(&self, key: &str) -> Result<i64, CounterError>;
}
