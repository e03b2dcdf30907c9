//! Cache-aside helpers: read-through with a caller-supplied producer, and
//! bulk warming.
//!
//! ## Request coalescing
//!
//! With [`CacheOptions::coalesce`] set, concurrent misses on the same key
//! queue on a per-key mutex. The first caller runs the producer and writes the
//! result; the others re-read the cache once they get the lock and only run
//! their own producer if the write did not land. Without it every caller that
//! misses runs its producer independently.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{CacheOptions, CacheService};
use crate::keys::build_key;

/// Outcome of [`CacheService::warm_cache`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmSummary {
    /// Keys whose producer succeeded and whose value was handed to the store.
    pub warmed: usize,
    /// Keys whose producer or encoding failed.
    pub failed: Vec<String>,
}

/// A caller's claim on a per-key in-flight lock, waiting or held.
///
/// Dropping it, including while still waiting, removes the map entry once no
/// other caller references it.
struct InflightGuard<'a> {
    inflight: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Only the map's own reference left: nobody holds or waits on it.
        self.inflight.remove_if(&self.key, |_, m| Arc::strong_count(m) == 1);
    }
}

impl CacheService {
    async fn lock_inflight(&self, full_key: &str) -> InflightGuard<'_> {
        // Declared before the mutex handle so a cancelled wait drops the
        // handle first and the cleanup sees the final count.
        let mut inflight = InflightGuard {
            inflight: &self.inflight,
            key: full_key.to_string(),
            guard: None,
        };
        let mutex = Arc::clone(&self.inflight.entry(full_key.to_string()).or_default());
        inflight.guard = Some(mutex.lock_owned().await);
        inflight
    }

    /// Return the cached value for `key`, or run `producer`, cache its result
    /// and return it.
    ///
    /// A producer error is returned as-is and nothing is cached. A cached entry
    /// that no longer decodes as `T` is treated as stale and overwritten. Store
    /// trouble never fails the call; the produced value is returned uncached.
    pub async fn get_or_set<T, F, Fut, E>(&self, key: &str, producer: F, options: &CacheOptions) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let prefix = options.prefix.as_deref();
        if let Some(value) = self.cached_for_aside(key, prefix).await {
            return Ok(value);
        }

        let _inflight = if options.coalesce {
            let guard = self.lock_inflight(&build_key(key, prefix)).await;
            if let Some(value) = self.cached_for_aside(key, prefix).await {
                return Ok(value);
            }
            Some(guard)
        } else {
            None
        };

        let value = producer().await?;
        if let Err(e) = self.set(key, &value, options.ttl, prefix).await {
            tracing::warn!(key = %e.key(), error = %e, "get_or_set: returning value uncached");
        }
        Ok(value)
    }

    async fn cached_for_aside<T: DeserializeOwned>(&self, key: &str, prefix: Option<&str>) -> Option<T> {
        match self.get::<T>(key, prefix).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(key = %e.key(), "get_or_set: cached entry unreadable, recomputing");
                None
            }
        }
    }

    /// Produce and store a value for every key concurrently. One key failing
    /// does not stop the others; failures are logged and listed in the summary.
    pub async fn warm_cache<K, T, F, Fut, E>(&self, keys: &[K], producer: F, options: &CacheOptions) -> WarmSummary
    where
        K: AsRef<str>,
        T: Serialize,
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let prefix = options.prefix.as_deref();
        let producer = &producer;
        let results = join_all(keys.iter().map(|key| async move {
            let key = key.as_ref();
            let outcome = match producer(key.to_string()).await {
                Ok(value) => self
                    .set(key, &value, options.ttl, prefix)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            (key, outcome)
        }))
        .await;

        let mut summary = WarmSummary::default();
        for (key, outcome) in results {
            match outcome {
                Ok(()) => summary.warmed += 1,
                Err(error) => {
                    tracing::error!(key = %key, error = %error, "cache warm failed for key");
                    summary.failed.push(key.to_string());
                }
            }
        }
        tracing::info!(warmed = summary.warmed, failed = summary.failed.len(), "Cache warming finished");
        summary
    }
}
