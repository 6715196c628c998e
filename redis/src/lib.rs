//! Redis backends for the Farewell pipeline.
//!
//! Two primitives live here, both built on a pooled
//! [`ConnectionManager`](redis::aio::ConnectionManager):
//!
//! - [`RedisCounterStore`] - the atomic stock counter. The decrement, the
//!   floor check and the compensating increment execute inside a single Lua
//!   script, so the operation is linearizable across all callers and the
//!   stored value never rests below zero.
//! - [`RedisAdmissionLock`] - a lease-based per-identity lock (`SET NX PX`
//!   with a fencing token and compare-and-delete release). Lease expiry is
//!   the sole safety net against crashed holders.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod counter;
mod lock;

pub use counter::RedisCounterStore;
pub use lock::RedisAdmissionLock;

use farewell_core::counter::CounterError;
use redis::aio::ConnectionManager;

/// Open a pooled async connection manager for the given URL.
///
/// # Errors
///
/// Returns [`CounterError::Unavailable`] if the client cannot be created or
/// the initial connection fails.
pub async fn connect(redis_url: &str) -> Result<ConnectionManager, CounterError> {
    let client = redis::Client::open(redis_url)
        .map_err(|e| CounterError::Unavailable(format!("failed to create Redis client: {e}")))?;

    ConnectionManager::new(client).await.map_err(|e| {
        CounterError::Unavailable(format!("failed to create Redis connection manager: {e}"))
    })
}
