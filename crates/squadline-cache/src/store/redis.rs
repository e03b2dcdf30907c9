//! Redis store over a `deadpool-redis` connection pool.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};
use redis::{AsyncCommands, Script};

use super::KeyValueStore;
use crate::config::RedisConfig;
use crate::error::{StoreError, StoreResult};

/// Increment, then give the key an expiry only if it has none.
///
/// Runs server-side as one unit, so a fresh window always gets its TTL and
/// later increments never extend it. A counter left without TTL by an older
/// client is repaired on its next increment.
const INCR_IN_WINDOW_LUA: &str = r#"
local current = redis.call('INCRBY', KEYS[1], ARGV[1])
if redis.call('TTL', KEYS[1]) < 0 then
    redis.call('EXPIRE', KEYS[1], ARGV[2])
end
return current
"#;

/// Keys requested per `SCAN` round-trip.
const SCAN_BATCH: usize = 500;

/// Pooled Redis store.
pub struct RedisStore {
    pool: Pool,
    incr_in_window: Script,
}

impl RedisStore {
    /// Wrap an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            incr_in_window: Script::new(INCR_IN_WINDOW_LUA),
        }
    }

    async fn conn(&self) -> StoreResult<Connection> {
        if self.pool.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(self.pool.get().await?)
    }
}

/// Build a [`RedisStore`] from configuration.
///
/// Only the pool is created here; no connection is opened until the
/// [`ConnectionManager`](crate::ConnectionManager) probes it.
pub fn create_redis_store(config: &RedisConfig) -> StoreResult<RedisStore> {
    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let timeout = Duration::from_millis(config.timeout_ms);
    let pool_config = redis_config
        .pool
        .get_or_insert_with(|| deadpool_redis::PoolConfig::new(config.pool_size));
    pool_config.max_size = config.pool_size;
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);

    let pool = redis_config
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|e| StoreError::Unavailable(format!("failed to create Redis pool: {e}")))?;

    tracing::debug!(url = %config.url, pool_size = config.pool_size, "Redis pool created");
    Ok(RedisStore::new(pool))
}

/// Pull `used_memory:<bytes>` out of an `INFO memory` reply.
fn parse_used_memory(info: &str) -> Option<u64> {
    info.lines()
        .find_map(|line| line.trim().strip_prefix("used_memory:"))
        .and_then(|v| v.trim().parse().ok())
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    fn client_ready(&self) -> bool {
        !self.pool.is_closed()
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        Ok(conn.get::<_, Option<Vec<u8>>>(key).await?)
    }

    async fn set(&self, key: &str, value: &[u8], ttl_secs: Option<u64>) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        match ttl_secs {
            Some(secs) => conn.set_ex::<_, _, ()>(key, value, secs).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        Ok(conn.del::<_, u64>(keys).await?)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.exists::<_, bool>(key).await?)
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        Ok(conn.ttl::<_, i64>(key).await?)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let secs = i64::try_from(ttl_secs)
            .map_err(|_| StoreError::Command(format!("ttl out of range: {ttl_secs}")))?;
        Ok(conn.expire::<_, bool>(key, secs).await?)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        Ok(conn.incr::<_, _, i64>(key, delta).await?)
    }

    async fn incr_in_window(&self, key: &str, delta: i64, window_secs: u64) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        let current: i64 = self
            .incr_in_window
            .key(key)
            .arg(delta)
            .arg(window_secs)
            .invoke_async(&mut conn)
            .await?;
        Ok(current)
    }

    async fn scan_match(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once across iterations.
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    async fn db_size(&self) -> StoreResult<u64> {
        let mut conn = self.conn().await?;
        Ok(redis::cmd("DBSIZE").query_async(&mut conn).await?)
    }

    async fn used_memory(&self) -> StoreResult<u64> {
        let mut conn = self.conn().await?;
        let info: String = redis::cmd("INFO").arg("memory").query_async(&mut conn).await?;
        parse_used_memory(&info)
            .ok_or_else(|| StoreError::Command("INFO memory reply has no used_memory".to_string()))
    }

    async fn flush_db(&self) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close();
    }
}
