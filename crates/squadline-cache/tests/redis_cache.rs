//! Integration tests against a real Redis.
//!
//! Tests use testcontainers to spin up a shared Redis instance, so they need a
//! Docker daemon.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use squadline_cache::{
    CacheLayerConfig, CacheOptions, CacheService, ConnectionManager, KeyValueStore, MsgPackCodec,
    RedisConfig, Session, create_cache_service,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

/// Get or create the shared Redis container
async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");

            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            let url = format!("redis://127.0.0.1:{}", host_port);

            (container, url)
        })
        .await;

    url.clone()
}

/// Service over the shared container. Tests share one database, so each test
/// uses its own key namespace.
async fn redis_service() -> CacheService {
    let config = CacheLayerConfig {
        redis: RedisConfig {
            url: get_redis_url().await,
            ..RedisConfig::default()
        },
        ..CacheLayerConfig::default()
    };
    let cache = create_cache_service(&config).await.expect("create service");
    assert!(cache.is_ready(), "redis should be reachable");
    cache
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Fixture {
    home: String,
    away: String,
    kickoff: String,
}

fn derby() -> Fixture {
    Fixture {
        home: "Rovers".into(),
        away: "United".into(),
        kickoff: "2024-09-14T15:00:00Z".into(),
    }
}

#[tokio::test]
async fn test_redis_set_get_and_ttl() {
    let cache = redis_service().await;

    cache.set("it:setget:fixture", &derby(), Some(30), None).await.unwrap();
    assert_eq!(
        cache.get::<Fixture>("it:setget:fixture", None).await.unwrap(),
        Some(derby())
    );
    let ttl = cache.get_ttl("it:setget:fixture", None).await;
    assert!((29..=30).contains(&ttl), "ttl was {ttl}");

    cache.set("it:setget:forever", &1, Some(0), None).await.unwrap();
    assert_eq!(cache.get_ttl("it:setget:forever", None).await, -1);
    assert_eq!(cache.get_ttl("it:setget:missing", None).await, -2);

    cache
        .set_with::<MsgPackCodec, _>("it:setget:packed", &derby(), None, None)
        .await
        .unwrap();
    assert_eq!(
        cache
            .get_with::<MsgPackCodec, Fixture>("it:setget:packed", None)
            .await
            .unwrap(),
        Some(derby())
    );
}

#[tokio::test]
async fn test_redis_expiry() {
    let cache = redis_service().await;
    cache.set("it:expiry:k", &"v", Some(1), None).await.unwrap();
    assert!(cache.exists("it:expiry:k", None).await);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(cache.get::<String>("it:expiry:k", None).await.unwrap(), None);
}

#[tokio::test]
async fn test_redis_rate_limit_window() {
    let cache = redis_service().await;

    let remaining: Vec<u64> = {
        let mut out = Vec::new();
        for _ in 0..5 {
            let decision = cache.check_rate_limit("it:rl:user:1", 5, 2).await;
            assert!(decision.allowed);
            out.push(decision.remaining);
        }
        out
    };
    assert_eq!(remaining, vec![4, 3, 2, 1, 0]);
    assert!(!cache.check_rate_limit("it:rl:user:1", 5, 2).await.allowed);

    let ttl = cache.get_ttl("it:rl:user:1", None).await;
    assert!((1..=2).contains(&ttl), "window ttl was {ttl}");

    tokio::time::sleep(Duration::from_millis(2200)).await;
    let fresh = cache.check_rate_limit("it:rl:user:1", 5, 2).await;
    assert!(fresh.allowed);
    assert_eq!(fresh.remaining, 4);
}

#[tokio::test]
async fn test_redis_rate_limit_is_atomic_under_concurrency() {
    let cache = Arc::new(redis_service().await);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            cache.check_rate_limit("it:rl:burst", 10, 30).await.allowed
        }));
    }
    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 10);
}

#[tokio::test]
async fn test_redis_delete_by_pattern() {
    let cache = redis_service().await;
    for key in ["it:pat:user:42:a", "it:pat:user:42:b", "it:pat:user:7:a"] {
        cache.set(key, &1, None, None).await.unwrap();
    }

    assert_eq!(cache.delete_by_pattern("it:pat:user:42:*", None).await, 2);
    assert!(cache.exists("it:pat:user:7:a", None).await);
    assert_eq!(
        cache
            .delete_multiple(&["it:pat:user:7:a", "it:pat:none"], None)
            .await,
        1
    );
}

#[tokio::test]
async fn test_redis_counters_and_get_or_set() {
    let cache = redis_service().await;
    for _ in 0..4 {
        cache.increment("it:ctr:one", 1, None).await;
    }
    assert_eq!(cache.increment("it:ctr:bulk", 4, None).await, 4);
    assert_eq!(cache.get::<i64>("it:ctr:one", None).await.unwrap(), Some(4));
    assert_eq!(cache.decrement("it:ctr:bulk", 1, None).await, 3);

    let opts = CacheOptions::new().ttl(30).prefix("it:aside:");
    let first: Result<Fixture, String> = cache.get_or_set("derby", || async { Ok(derby()) }, &opts).await;
    assert_eq!(first.unwrap(), derby());
    let second: Result<Fixture, String> = cache
        .get_or_set("derby", || async { Err("producer must not run".to_string()) }, &opts)
        .await;
    assert_eq!(second.unwrap(), derby());
}

#[tokio::test]
async fn test_redis_sessions() {
    let cache = redis_service().await;
    let session = Session::new("it-sess-1", "u-9", "keeper@squadline.app", "player")
        .with_permissions(["squad:read"]);

    cache.set_session("it-sess-1", &session, None).await.unwrap();
    let updated = cache
        .update_session_activity("it-sess-1")
        .await
        .unwrap()
        .expect("session exists");
    assert!(updated.last_activity > session.last_activity);
    assert!(cache.delete_session("it-sess-1").await);
    assert_eq!(cache.get_session("it-sess-1").await.unwrap(), None);
}

#[tokio::test]
async fn test_redis_stats_and_health() {
    let cache = redis_service().await;
    cache.set("it:stats:a", &"x", None, None).await.unwrap();
    cache.get::<String>("it:stats:a", None).await.unwrap();

    let stats = cache.get_stats().await;
    assert!(stats.key_count >= 1);
    assert!(stats.memory_usage > 0);
    assert_eq!(stats.hits, 1);

    let health = cache.health_check().await;
    assert!(health.is_healthy(), "{}", health.details);
    assert_eq!(health.backend, "redis");
}

#[tokio::test]
async fn test_redis_store_probe_and_close() {
    let config = RedisConfig {
        url: get_redis_url().await,
        ..RedisConfig::default()
    };
    let store = Arc::new(squadline_cache::store::create_redis_store(&config).unwrap());
    store.ping().await.unwrap();

    let conn = Arc::new(ConnectionManager::new(store.clone()));
    assert!(conn.connect().await);
    conn.close().await;
    assert!(!conn.is_ready());
    assert!(store.ping().await.is_err());
}

#[tokio::test]
async fn test_unreachable_redis_reports_unhealthy() {
    let config = CacheLayerConfig {
        redis: RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
            timeout_ms: 200,
            ..RedisConfig::default()
        },
        ..CacheLayerConfig::default()
    };
    let cache = create_cache_service(&config).await.unwrap();

    let health = cache.health_check().await;
    assert!(!health.is_healthy());
    assert_eq!(health.details, "cache store not connected");
    assert!(cache.check_rate_limit("rl:any", 1, 60).await.allowed);
    assert_eq!(cache.get_stats().await.key_count, 0);
}
