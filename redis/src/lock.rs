//! Redis-backed per-identity admission lock.

use async_trait::async_trait;
use farewell_core::lock::{AdmissionLock, LockError, LockToken};
use rand::Rng;
use redis::Script;
use redis::aio::ConnectionManager;
use std::time::{Duration, Instant};

/// Delete the key only if it still holds the caller's token, so a stale
/// holder never releases a lock another caller took over after lease expiry.
const COMPARE_AND_DELETE_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
";

/// Interval between acquisition attempts within the wait window.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// `Redis`-backed [`AdmissionLock`] using `SET NX PX` leases.
///
/// # Example
///
/// ```no_run
/// use farewell_redis::{connect, RedisAdmissionLock};
/// use farewell_core::lock::AdmissionLock;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let conn = connect("redis://127.0.0.1:6379").await?;
/// let lock = RedisAdmissionLock::new(conn);
///
/// if let Some(token) = lock
///     .acquire("lock:event:apply:user@example.com", Duration::from_secs(10), Duration::from_secs(1))
///     .await?
/// {
///     // critical section
///     lock.release("lock:event:apply:user@example.com", &token).await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct RedisAdmissionLock {
    conn: ConnectionManager,
    release_script: Script,
}

impl RedisAdmissionLock {
    /// Create a lock over an existing connection manager.
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            release_script: Script::new(COMPARE_AND_DELETE_SCRIPT),
        }
    }

    /// Random fencing token, unique enough across holders and retries.
    fn fresh_token() -> String {
        let value: u128 = rand::thread_rng().r#gen();
        format!("{value:032x}")
    }

    async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
    ) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();
        let lease_ms = lease.as_millis().max(1);
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(lease_ms as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| LockError::Backend(format!("SET NX PX failed: {e}")))?;
        Ok(reply.is_some())
    }
}

#[async_trait]
impl AdmissionLock for RedisAdmissionLock {
    async fn acquire(
        &self,
        key: &str,
        wait: Duration,
        lease: Duration,
    ) -> Result<Option<LockToken>, LockError> {
        let token = Self::fresh_token();
        let deadline = Instant::now() + wait;

        loop {
            if self.try_acquire(key, &token, lease).await? {
                tracing::debug!(key, "admission lock acquired");
                return Ok(Some(LockToken::new(token)));
            }
            if Instant::now() >= deadline {
                tracing::debug!(key, "admission lock wait timed out");
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn release(&self, key: &str, token: &LockToken) -> Result<(), LockError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .release_script
            .key(key)
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockError::Backend(format!("compare-and-delete failed: {e}")))?;

        if deleted == 0 {
            // Lease already expired or taken over; nothing to release.
            tracing::debug!(key, "admission lock already expired at release");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedisAdmissionLock>();
        assert_sync::<RedisAdmissionLock>();
    }

    #[test]
    fn tokens_are_distinct() {
        assert_ne!(
            RedisAdmissionLock::fresh_token(),
            RedisAdmissionLock::fresh_token()
        );
    }

    #[test]
    fn release_script_compares_before_deleting() {
        assert!(COMPARE_AND_DELETE_SCRIPT.contains("GET"));
        assert!(COMPARE_AND_DELETE_SCRIPT.contains("ARGV[1]"));
    }
}
