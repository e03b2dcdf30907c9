//! Shared cache, rate-limiting and session layer for Squadline.
//!
//! Application code talks to a single [`CacheService`], built once at process
//! start with [`create_cache_service`] and shared by `Arc`. The service runs
//! over a [`KeyValueStore`]: Redis in production, [`MemoryStore`] for single
//! instance deployments and tests.

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod keys;
pub mod metrics;
pub mod observability;
pub mod service;
pub mod store;

use std::sync::Arc;

pub use codec::{Codec, JsonCodec, MsgPackCodec};
pub use self::config::{CacheConfig, CacheLayerConfig, RedisConfig, StoreBackend};
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{CodecError, ConfigError, StoreError};
pub use keys::{SESSION_PREFIX, build_key, escape_glob};
pub use observability::{apply_logging_level, init_tracing, init_tracing_with_level};
pub use service::{
    CacheOptions, CacheService, CacheStats, HealthReport, HealthStatus, RateLimitDecision,
    Session, USER_DATA_PATTERNS, WarmSummary,
};
pub use store::{KeyValueStore, MemoryStore, RedisStore};

/// Create the cache service described by `config`.
///
/// ## Backends
///
/// - **redis**: pooled connection to `redis.url`
/// - **memory**: in-process store, only coherent within one process
///
/// ## Graceful Degradation
///
/// An unreachable Redis does not fail startup. The service comes up not ready,
/// every operation returns its safe default, and the connection manager keeps
/// re-probing in the background until the store answers. Only an unusable
/// configuration (e.g. a malformed URL) is an error.
pub async fn create_cache_service(config: &CacheLayerConfig) -> Result<CacheService, StoreError> {
    let store: Arc<dyn KeyValueStore> = match config.cache.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-process memory store");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Redis => {
            tracing::info!(url = %config.redis.url, "Connecting to Redis");
            Arc::new(store::create_redis_store(&config.redis)?)
        }
    };

    let (initial, max) = config.redis.reconnect_backoff();
    let conn = Arc::new(ConnectionManager::with_backoff(store, initial, max));
    if !conn.connect().await {
        tracing::warn!(
            backend = %config.cache.backend,
            "Cache store unavailable at startup, continuing without cache"
        );
    }

    Ok(CacheService::new(conn, &config.cache))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_is_ready() {
        let mut config = CacheLayerConfig::default();
        config.cache.backend = StoreBackend::Memory;

        let cache = create_cache_service(&config).await.unwrap();
        assert!(cache.is_ready());
        assert_eq!(cache.connection().backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_unreachable_redis_starts_degraded() {
        let mut config = CacheLayerConfig::default();
        config.redis.url = "redis://127.0.0.1:1".to_string();
        config.redis.timeout_ms = 200;

        let cache = create_cache_service(&config).await.unwrap();
        assert!(!cache.is_ready());
        assert_eq!(cache.get::<String>("anything", None).await.unwrap(), None);
        assert!(cache.check_rate_limit("rl:x", 1, 60).await.allowed);
        cache.close().await;
    }

    #[tokio::test]
    async fn test_malformed_url_is_an_error() {
        let mut config = CacheLayerConfig::default();
        config.redis.url = "not a url".to_string();
        assert!(create_cache_service(&config).await.is_err());
    }
}
