//! Hit/miss accounting, stats snapshots and the health probe.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::CacheService;
use crate::connection::ConnectionState;
use crate::metrics;

/// Process-local hit/miss counters.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_hit();
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_miss();
    }

    fn snapshot(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CacheStats {
    /// Number of cache hits since start or the last reset.
    pub hits: u64,
    /// Number of cache misses since start or the last reset.
    pub misses: u64,
    /// Keys in the store (0 when the store is unreachable).
    pub key_count: u64,
    /// Bytes used by the store (0 when the store is unreachable).
    pub memory_usage: u64,
    /// Seconds since this service was constructed.
    pub uptime_secs: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        hit_rate(self.hits, self.misses)
    }
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        (hits as f64 / total as f64) * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Result of [`CacheService::health_check`].
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub details: String,
    pub backend: &'static str,
    pub state: ConnectionState,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

impl CacheService {
    /// Local counters plus live key count and memory from the store.
    pub async fn get_stats(&self) -> CacheStats {
        let (hits, misses) = self.counters.snapshot();
        let mut stats = CacheStats {
            hits,
            misses,
            uptime_secs: self.started_at.elapsed().as_secs(),
            ..CacheStats::default()
        };
        if !self.conn.is_ready() {
            return stats;
        }

        match self.conn.store().db_size().await {
            Ok(count) => {
                stats.key_count = count;
                metrics::set_cache_keys(count);
            }
            Err(e) => self.store_failed("stats", "DBSIZE", &e),
        }
        // A failed DBSIZE may already have taken the connection down.
        if self.conn.is_ready() {
            match self.conn.store().used_memory().await {
                Ok(bytes) => stats.memory_usage = bytes,
                Err(e) => self.store_failed("stats", "INFO memory", &e),
            }
        }
        stats
    }

    /// `hits / (hits + misses) * 100`, or 0 before any lookup.
    pub fn get_hit_rate(&self) -> f64 {
        let (hits, misses) = self.counters.snapshot();
        hit_rate(hits, misses)
    }

    pub fn reset_stats(&self) {
        self.counters.reset();
        tracing::info!("Cache statistics reset");
    }

    /// Healthy iff the connection is ready and a live PING round-trips.
    pub async fn health_check(&self) -> HealthReport {
        let backend = self.conn.backend_name();
        if !self.conn.is_ready() {
            return HealthReport {
                status: HealthStatus::Unhealthy,
                details: "cache store not connected".to_string(),
                backend,
                state: self.conn.state(),
            };
        }
        match self.conn.store().ping().await {
            Ok(()) => HealthReport {
                status: HealthStatus::Healthy,
                details: "cache store is responding".to_string(),
                backend,
                state: self.conn.state(),
            },
            Err(e) => {
                self.store_failed("health_check", "PING", &e);
                HealthReport {
                    status: HealthStatus::Unhealthy,
                    details: e.to_string(),
                    backend,
                    state: self.conn.state(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::memory_service;
    use crate::store::KeyValueStore;

    #[tokio::test]
    async fn test_hit_rate() {
        let (cache, _) = memory_service().await;
        assert_eq!(cache.get_hit_rate(), 0.0);

        cache.set("k", &1, None, None).await.unwrap();
        cache.get::<i64>("k", None).await.unwrap();
        cache.get::<i64>("missing", None).await.unwrap();
        assert_eq!(cache.get_hit_rate(), 50.0);

        cache.reset_stats();
        assert_eq!(cache.get_hit_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_stats_snapshot() {
        let (cache, _) = memory_service().await;
        cache.set("a", &"x", None, None).await.unwrap();
        cache.set("b", &"y", None, None).await.unwrap();
        cache.get::<String>("a", None).await.unwrap();

        let stats = cache.get_stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.key_count, 2);
        assert!(stats.memory_usage > 0);
        assert_eq!(stats.hit_rate(), 100.0);
    }

    #[tokio::test]
    async fn test_stats_zeroed_when_down() {
        let (cache, store) = memory_service().await;
        cache.set("a", &"x", None, None).await.unwrap();
        cache.get::<String>("a", None).await.unwrap();
        store.set_online(false);

        let stats = cache.get_stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.key_count, 0);
        assert_eq!(stats.memory_usage, 0);
        assert!(!store.client_ready());
    }

    #[tokio::test]
    async fn test_health_check() {
        let (cache, store) = memory_service().await;
        let report = cache.health_check().await;
        assert!(report.is_healthy());
        assert_eq!(report.backend, "memory");

        store.set_online(false);
        let report = cache.health_check().await;
        assert!(!report.is_healthy());
        assert_eq!(report.details, "cache store not connected");
    }
}
