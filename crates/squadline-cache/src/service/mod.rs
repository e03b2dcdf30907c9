//! The cache service: every operation the application calls.
//!
//! ## Failure Policy
//!
//! No failure of the backing store reaches the caller. Each operation checks
//! readiness first (warn + safe default when not ready), then issues its
//! command; a failed command is logged at error level, fed back to the
//! [`ConnectionManager`], and converted to the same safe default.
//!
//! | Operation            | Safe default |
//! |----------------------|--------------|
//! | `get`                | `None`       |
//! | `set` / `set_ttl`    | no-op        |
//! | `delete*`            | `false` / 0  |
//! | `exists`             | `false`      |
//! | `get_ttl`            | `-1`         |
//! | `increment`          | `0`          |
//! | `check_rate_limit`   | allowed      |
//!
//! Payload encode/decode failures are the one thing reported back, through
//! [`CodecError`], so a corrupt entry is never mistaken for a miss.

mod aside;
mod invalidation;
mod rate_limit;
mod session;
mod stats;

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec::{Codec, JsonCodec};
use crate::config::CacheConfig;
use crate::connection::ConnectionManager;
use crate::error::{CodecError, StoreError};
use crate::keys::build_key;
use crate::metrics;

pub use aside::WarmSummary;
pub use invalidation::USER_DATA_PATTERNS;
pub use rate_limit::RateLimitDecision;
pub use session::Session;
pub use stats::{CacheStats, HealthReport, HealthStatus};

use stats::StatsCounters;

/// Per-call options for the cache-aside helpers.
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// TTL in seconds; `None` uses the configured default, `Some(0)` stores without expiry.
    pub ttl: Option<u64>,
    /// Key prefix; `None` means no prefix.
    pub prefix: Option<String>,
    /// Collapse concurrent misses on the same key into one producer call.
    pub coalesce: bool,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, secs: u64) -> Self {
        self.ttl = Some(secs);
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn coalesce(mut self, enabled: bool) -> Self {
        self.coalesce = enabled;
        self
    }
}

/// Shared cache, rate-limit and session layer.
///
/// Construct one per process (see [`create_cache_service`](crate::create_cache_service))
/// and hand out `Arc<CacheService>` to whatever needs it.
pub struct CacheService {
    conn: Arc<ConnectionManager>,
    default_ttl_secs: u64,
    session_ttl_secs: u64,
    counters: StatsCounters,
    started_at: Instant,
    inflight: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl CacheService {
    pub fn new(conn: Arc<ConnectionManager>, settings: &CacheConfig) -> Self {
        Self {
            conn,
            default_ttl_secs: settings.default_ttl_secs,
            session_ttl_secs: settings.session_ttl_secs,
            counters: StatsCounters::default(),
            started_at: Instant::now(),
            inflight: DashMap::new(),
        }
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.conn
    }

    /// Whether commands are currently being sent to the store.
    pub fn is_ready(&self) -> bool {
        self.conn.is_ready()
    }

    pub fn default_ttl_secs(&self) -> u64 {
        self.default_ttl_secs
    }

    fn ready_or_skip(&self, op: &'static str) -> bool {
        if self.conn.is_ready() {
            true
        } else {
            tracing::warn!(op, state = %self.conn.state(), "cache store not ready, skipping");
            false
        }
    }

    fn store_failed(&self, op: &'static str, key: &str, err: &StoreError) {
        metrics::record_store_error(op);
        tracing::error!(op, key = %key, error = %err, "cache store operation failed");
        self.conn.observe_error(err);
    }

    /// `None` → configured default; `Some(0)` → no expiry.
    fn effective_ttl(&self, ttl: Option<u64>) -> Option<u64> {
        match ttl.unwrap_or(self.default_ttl_secs) {
            0 => None,
            secs => Some(secs),
        }
    }

    // =========================================================================
    // Reads and writes
    // =========================================================================

    /// Store `value` as JSON. See [`set_with`](Self::set_with).
    pub async fn set<T>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: Option<u64>,
        prefix: Option<&str>,
    ) -> Result<(), CodecError>
    where
        T: Serialize + ?Sized,
    {
        self.set_with::<JsonCodec, T>(key, value, ttl_secs, prefix).await
    }

    /// Store `value` encoded with codec `C`.
    ///
    /// A positive TTL stores with expiry, `Some(0)` stores without, and `None`
    /// uses the configured default. Store failures are logged and swallowed;
    /// only an encode failure is returned.
    pub async fn set_with<C, T>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: Option<u64>,
        prefix: Option<&str>,
    ) -> Result<(), CodecError>
    where
        C: Codec,
        T: Serialize + ?Sized,
    {
        let full = build_key(key, prefix);
        let bytes = C::encode(&full, value).inspect_err(|e| {
            metrics::record_codec_error("set");
            tracing::error!(key = %full, error = %e, "cache set: encode failed");
        })?;

        if !self.ready_or_skip("set") {
            return Ok(());
        }
        let ttl = self.effective_ttl(ttl_secs);
        match self.conn.store().set(&full, &bytes, ttl).await {
            Ok(()) => tracing::debug!(key = %full, ttl_secs = ?ttl, "cache set"),
            Err(e) => self.store_failed("set", &full, &e),
        }
        Ok(())
    }

    /// Read a JSON value. See [`get_with`](Self::get_with).
    pub async fn get<T>(&self, key: &str, prefix: Option<&str>) -> Result<Option<T>, CodecError>
    where
        T: DeserializeOwned,
    {
        self.get_with::<JsonCodec, T>(key, prefix).await
    }

    /// Read a value encoded with codec `C`.
    ///
    /// `Ok(None)` is a miss (or an unreachable store). A hit whose payload does
    /// not decode is an `Err`, not a miss; it still counts as a hit.
    pub async fn get_with<C, T>(&self, key: &str, prefix: Option<&str>) -> Result<Option<T>, CodecError>
    where
        C: Codec,
        T: DeserializeOwned,
    {
        if !self.ready_or_skip("get") {
            return Ok(None);
        }
        let full = build_key(key, prefix);
        match self.conn.store().get(&full).await {
            Ok(None) => {
                self.counters.record_miss();
                tracing::debug!(key = %full, "cache miss");
                Ok(None)
            }
            Ok(Some(bytes)) => {
                self.counters.record_hit();
                tracing::debug!(key = %full, "cache hit");
                C::decode(&full, &bytes).map(Some).inspect_err(|e| {
                    metrics::record_codec_error("get");
                    tracing::error!(key = %full, error = %e, "cache get: decode failed");
                })
            }
            Err(e) => {
                self.store_failed("get", &full, &e);
                Ok(None)
            }
        }
    }

    /// Delete one key. Returns whether it existed; absent keys are not an error.
    pub async fn delete(&self, key: &str, prefix: Option<&str>) -> bool {
        if !self.ready_or_skip("delete") {
            return false;
        }
        let full = build_key(key, prefix);
        match self.conn.store().del(std::slice::from_ref(&full)).await {
            Ok(n) => {
                tracing::debug!(key = %full, "cache delete");
                n > 0
            }
            Err(e) => {
                self.store_failed("delete", &full, &e);
                false
            }
        }
    }

    /// Delete several keys in one round-trip. Returns how many existed.
    pub async fn delete_multiple<K>(&self, keys: &[K], prefix: Option<&str>) -> u64
    where
        K: AsRef<str>,
    {
        if keys.is_empty() || !self.ready_or_skip("delete_multiple") {
            return 0;
        }
        let full: Vec<String> = keys.iter().map(|k| build_key(k.as_ref(), prefix)).collect();
        match self.conn.store().del(&full).await {
            Ok(n) => {
                tracing::debug!(requested = full.len(), removed = n, "cache delete multiple");
                n
            }
            Err(e) => {
                self.store_failed("delete_multiple", &full.join(","), &e);
                0
            }
        }
    }

    /// Delete every key matching a glob `pattern` (after prefixing).
    ///
    /// Scan then bulk delete, not atomic: keys created after the scan survive,
    /// keys created during it may or may not be included.
    pub async fn delete_by_pattern(&self, pattern: &str, prefix: Option<&str>) -> u64 {
        if !self.ready_or_skip("delete_by_pattern") {
            return 0;
        }
        let full = build_key(pattern, prefix);
        let keys = match self.conn.store().scan_match(&full).await {
            Ok(keys) => keys,
            Err(e) => {
                self.store_failed("delete_by_pattern", &full, &e);
                return 0;
            }
        };
        if keys.is_empty() {
            return 0;
        }
        match self.conn.store().del(&keys).await {
            Ok(n) => {
                tracing::debug!(pattern = %full, removed = n, "cache delete by pattern");
                n
            }
            Err(e) => {
                self.store_failed("delete_by_pattern", &full, &e);
                0
            }
        }
    }

    pub async fn exists(&self, key: &str, prefix: Option<&str>) -> bool {
        if !self.conn.is_ready() {
            return false;
        }
        let full = build_key(key, prefix);
        match self.conn.store().exists(&full).await {
            Ok(found) => found,
            Err(e) => {
                self.store_failed("exists", &full, &e);
                false
            }
        }
    }

    /// Remaining TTL in seconds as reported by the store (`-2` missing key,
    /// `-1` no expiry), or `-1` when the store can't be asked.
    pub async fn get_ttl(&self, key: &str, prefix: Option<&str>) -> i64 {
        if !self.conn.is_ready() {
            return -1;
        }
        let full = build_key(key, prefix);
        match self.conn.store().ttl(&full).await {
            Ok(ttl) => ttl,
            Err(e) => {
                self.store_failed("get_ttl", &full, &e);
                -1
            }
        }
    }

    /// Set the expiry of an existing key. Returns whether the key existed.
    pub async fn set_ttl(&self, key: &str, ttl_secs: u64, prefix: Option<&str>) -> bool {
        if !self.ready_or_skip("set_ttl") {
            return false;
        }
        let full = build_key(key, prefix);
        match self.conn.store().expire(&full, ttl_secs).await {
            Ok(applied) => {
                tracing::debug!(key = %full, ttl_secs, applied, "cache ttl set");
                applied
            }
            Err(e) => {
                self.store_failed("set_ttl", &full, &e);
                false
            }
        }
    }

    // =========================================================================
    // Counters
    // =========================================================================

    /// Atomically add `amount`; returns the new value.
    ///
    /// Returns `0` when the store is unavailable or rejects the command, which
    /// callers cannot tell apart from a counter that is genuinely zero.
    pub async fn increment(&self, key: &str, amount: i64, prefix: Option<&str>) -> i64 {
        if !self.ready_or_skip("increment") {
            return 0;
        }
        let full = build_key(key, prefix);
        match self.conn.store().incr_by(&full, amount).await {
            Ok(value) => {
                tracing::debug!(key = %full, amount, value, "cache increment");
                value
            }
            Err(e) => {
                self.store_failed("increment", &full, &e);
                0
            }
        }
    }

    /// Atomically subtract `amount`; same `0` fallback as [`increment`](Self::increment).
    pub async fn decrement(&self, key: &str, amount: i64, prefix: Option<&str>) -> i64 {
        match amount.checked_neg() {
            Some(delta) => self.increment(key, delta, prefix).await,
            None => {
                tracing::error!(key = %key, amount, "cache decrement: amount out of range");
                0
            }
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Remove every key in the store's current database.
    pub async fn clear_all(&self) {
        if !self.ready_or_skip("clear_all") {
            return;
        }
        match self.conn.store().flush_db().await {
            Ok(()) => tracing::info!("Cache cleared"),
            Err(e) => self.store_failed("clear_all", "*", &e),
        }
    }

    /// Close the store connection. Later operations fall back to their defaults.
    pub async fn close(&self) {
        self.conn.close().await;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::store::MemoryStore;

    /// Connected service over a fresh in-memory store, plus the store handle
    /// for simulating outages.
    pub(crate) async fn memory_service() -> (CacheService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let conn = Arc::new(ConnectionManager::new(store.clone()));
        conn.connect().await;
        (CacheService::new(conn, &CacheConfig::default()), store)
    }
}
