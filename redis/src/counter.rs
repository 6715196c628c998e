//! Redis-backed atomic stock counter.

use async_trait::async_trait;
use farewell_core::counter::{CounterError, CounterStore, SOLD_OUT};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::Script;

/// Sentinel the script returns when the counter key has never been set.
const KEY_MISSING: i64 = -2;

/// Decrement with floor check and compensating increment, in one atomic
/// server-side step. Returns the post-decrement value, `-1` when the stock
/// is exhausted (after compensating), or `-2` when the key does not exist.
const DECREMENT_WITH_FLOOR_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return -2
end
local stock = redis.call('DECR', KEYS[1])
if tonumber(stock) < 0 then
  redis.call('INCR', KEYS[1])
  return -1
end
return stock
";

/// `Redis`-backed [`CounterStore`].
///
/// # Example
///
/// ```no_run
/// use farewell_redis::{connect, RedisCounterStore};
/// use farewell_core::counter::CounterStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let conn = connect("redis://127.0.0.1:6379").await?;
/// let counter = RedisCounterStore::new(conn);
///
/// counter.set("gift:stock", 100).await?;
/// let remaining = counter.decrement_with_floor("gift:stock").await?;
/// # Ok(())
/// # }
/// ```
pub struct RedisCounterStore {
    conn: ConnectionManager,
    script: Script,
}

impl RedisCounterStore {
    /// Create a counter store over an existing connection manager.
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            script: Script::new(DECREMENT_WITH_FLOOR_SCRIPT),
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn decrement_with_floor(&self, key: &str) -> Result<i64, CounterError> {
        let mut conn = self.conn.clone();
        let result: i64 = self
            .script
            .key(key)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CounterError::Unavailable(format!("decrement script failed: {e}")))?;

        if result == KEY_MISSING {
            return Err(CounterError::Missing(key.to_string()));
        }

        if result == SOLD_OUT {
            tracing::debug!(key, "stock exhausted, decrement compensated");
        } else {
            tracing::debug!(key, remaining = result, "stock counter decremented");
        }
        Ok(result)
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), CounterError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(key, value)
            .await
            .map_err(|e| CounterError::Unavailable(format!("failed to set counter: {e}")))?;

        tracing::info!(key, value, "stock counter set");
        Ok(())
    }

    async fn current(&self, key: &str) -> Result<i64, CounterError> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = conn
            .get(key)
            .await
            .map_err(|e| CounterError::Unavailable(format!("failed to read counter: {e}")))?;

        value.ok_or_else(|| CounterError::Missing(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_store_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedisCounterStore>();
        assert_sync::<RedisCounterStore>();
    }

    #[test]
    fn script_compensates_before_returning_sentinel() {
        // The INCR must appear on the negative branch, before the -1 return.
        let negative_branch = DECREMENT_WITH_FLOOR_SCRIPT
            .split("if tonumber(stock) < 0 then")
            .nth(1)
            .unwrap_or("");
        assert!(negative_branch.contains("INCR"));
        assert!(negative_branch.contains("return -1"));
    }

    #[test]
    fn script_distinguishes_missing_key() {
        assert!(DECREMENT_WITH_FLOOR_SCRIPT.contains("EXISTS"));
        assert!(DECREMENT_WITH_FLOOR_SCRIPT.contains("return -2"));
    }
}
