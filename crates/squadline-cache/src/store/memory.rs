//! In-process store backed by `DashMap`.
//!
//! Mirrors the subset of Redis semantics the cache layer relies on: lazy TTL
//! expiry, integer counters stored as decimal strings, glob key matching.
//! Expiry uses the tokio clock, so tests can drive it with a paused runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use super::{KeyValueStore, TTL_MISSING, TTL_PERSISTENT, glob};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone)]
struct StoredValue {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(data: Vec<u8>, ttl_secs: Option<u64>) -> Self {
        Self {
            data,
            expires_at: ttl_secs.and_then(|secs| deadline(Instant::now(), secs)),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// `now + secs`, or `None` when that lies past what the clock can represent.
/// Such a TTL never elapses, so the entry is kept without expiry.
fn deadline(now: Instant, secs: u64) -> Option<Instant> {
    now.checked_add(Duration::from_secs(secs))
}

/// Single-instance store with Redis-compatible TTL behaviour.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredValue>,
    closed: AtomicBool,
    offline: AtomicBool,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing (or regaining) the link. While offline every command
    /// fails with [`StoreError::Unavailable`] and the data is retained.
    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    /// Simulate a link that drops mid-command: the client still reports
    /// ready, but every command fails with [`StoreError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset by peer".to_string()));
        }
        Ok(())
    }

    /// Live value for `key`, dropping it first if it has expired.
    fn live(&self, key: &str) -> Option<StoredValue> {
        let now = Instant::now();
        let value = self.entries.get(key).map(|e| e.value().clone())?;
        if value.is_expired(now) {
            self.entries.remove_if(key, |_, v| v.is_expired(now));
            return None;
        }
        Some(value)
    }

    fn parse_counter(data: &[u8]) -> StoreResult<i64> {
        std::str::from_utf8(data)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| StoreError::Command("value is not an integer or out of range".to_string()))
    }

    /// Shared body of `incr_by` and `incr_in_window`, run under the entry lock.
    fn add(&self, key: &str, delta: i64, window_secs: Option<u64>) -> StoreResult<i64> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if !occupied.get().is_expired(now) => {
                let current = Self::parse_counter(&occupied.get().data)?;
                let next = current
                    .checked_add(delta)
                    .ok_or_else(|| StoreError::Command("increment or decrement would overflow".to_string()))?;
                let stored = occupied.get_mut();
                stored.data = next.to_string().into_bytes();
                if let (Some(secs), None) = (window_secs, stored.expires_at) {
                    stored.expires_at = deadline(now, secs);
                }
                Ok(next)
            }
            Entry::Occupied(mut occupied) => {
                occupied.insert(StoredValue::new(delta.to_string().into_bytes(), window_secs));
                Ok(delta)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue::new(delta.to_string().into_bytes(), window_secs));
                Ok(delta)
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn client_ready(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.offline.load(Ordering::SeqCst)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check()
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check()?;
        Ok(self.live(key).map(|v| v.data))
    }

    async fn set(&self, key: &str, value: &[u8], ttl_secs: Option<u64>) -> StoreResult<()> {
        self.check()?;
        self.entries
            .insert(key.to_string(), StoredValue::new(value.to_vec(), ttl_secs));
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        self.check()?;
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|k| self.entries.remove(k))
            .filter(|(_, v)| !v.is_expired(now))
            .count();
        Ok(removed as u64)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.check()?;
        Ok(self.live(key).is_some())
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        self.check()?;
        let Some(value) = self.live(key) else {
            return Ok(TTL_MISSING);
        };
        Ok(match value.expires_at {
            None => TTL_PERSISTENT,
            Some(at) => {
                let left = at.saturating_duration_since(Instant::now());
                // Redis rounds the remaining time to the nearest second.
                i64::try_from((left.as_millis() + 500) / 1000).unwrap_or(i64::MAX)
            }
        })
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool> {
        self.check()?;
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.expires_at = deadline(now, ttl_secs);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64> {
        self.check()?;
        self.add(key, delta, None)
    }

    async fn incr_in_window(&self, key: &str, delta: i64, window_secs: u64) -> StoreResult<i64> {
        self.check()?;
        self.add(key, delta, Some(window_secs))
    }

    async fn scan_match(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.check()?;
        let matcher = glob::compile(pattern)?;
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|e| !e.value().is_expired(now) && matcher.is_match(e.key()))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn db_size(&self) -> StoreResult<u64> {
        self.check()?;
        let now = Instant::now();
        Ok(self.entries.iter().filter(|e| !e.value().is_expired(now)).count() as u64)
    }

    async fn used_memory(&self) -> StoreResult<u64> {
        self.check()?;
        Ok(self
            .entries
            .iter()
            .map(|e| (e.key().len() + e.value().data.len()) as u64)
            .sum())
    }

    async fn flush_db(&self) -> StoreResult<()> {
        self.check()?;
        self.entries.clear();
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
