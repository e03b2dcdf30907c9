//! Key-value store port.
//!
//! [`KeyValueStore`] is the narrow command set the cache layer needs from its
//! backing store. Two implementations ship with the crate:
//!
//! - [`RedisStore`]: pooled Redis connections (`deadpool-redis`), the production backend
//! - [`MemoryStore`]: in-process `DashMap` with Redis-compatible TTL semantics,
//!   used for single-instance deployments and tests
//!
//! Every method is a single round-trip and individually fallible. Callers
//! never see [`StoreError`](crate::error::StoreError) directly: the
//! [`CacheService`](crate::CacheService) logs it and degrades.

mod glob;
pub mod memory;
pub mod redis;

use async_trait::async_trait;

use crate::error::StoreResult;

pub use self::memory::MemoryStore;
pub use self::redis::{RedisStore, create_redis_store};

/// TTL reply for a key that does not exist.
pub const TTL_MISSING: i64 = -2;
/// TTL reply for a key that exists without an expiry.
pub const TTL_PERSISTENT: i64 = -1;

/// Command set required from a backing key-value store.
///
/// TTL conventions follow Redis: `ttl` returns [`TTL_MISSING`] for absent keys
/// and [`TTL_PERSISTENT`] for keys without expiry.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Short backend name for logs and stats ("redis", "memory").
    fn backend_name(&self) -> &'static str;

    /// Whether the client itself considers the link usable.
    fn client_ready(&self) -> bool;

    /// Round-trip probe.
    async fn ping(&self) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store `value`; `ttl_secs` of `None` stores without expiry.
    async fn set(&self, key: &str, value: &[u8], ttl_secs: Option<u64>) -> StoreResult<()>;

    /// Delete `keys`, returning how many existed.
    async fn del(&self, keys: &[String]) -> StoreResult<u64>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    async fn ttl(&self, key: &str) -> StoreResult<i64>;

    /// Set an expiry on an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool>;

    /// Atomically add `delta` to the integer at `key` (absent counts as 0).
    async fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64>;

    /// Atomically add `delta` and, if the key carries no expiry afterwards,
    /// expire it in `window_secs`. Existing expiries are left untouched so a
    /// window is never extended by later increments.
    async fn incr_in_window(&self, key: &str, delta: i64, window_secs: u64) -> StoreResult<i64>;

    /// Keys matching a glob-style pattern (`*`, `?`, `[...]`, `\` escapes).
    async fn scan_match(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Number of keys in the current database.
    async fn db_size(&self) -> StoreResult<u64>;

    /// Memory used by the store, in bytes.
    async fn used_memory(&self) -> StoreResult<u64>;

    /// Remove every key in the current database.
    async fn flush_db(&self) -> StoreResult<()>;

    /// Release the underlying connections. Later commands fail with
    /// [`StoreError::Closed`](crate::error::StoreError::Closed).
    async fn close(&self);
}
