//! Fixed-window request counting.

use serde::Serialize;
use time::{OffsetDateTime, PrimitiveDateTime};

use super::CacheService;
use crate::keys::build_key;
use crate::metrics;

/// Outcome of one [`CacheService::check_rate_limit`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u64,
    /// Approximate end of the current window (`now + window`).
    #[serde(with = "time::serde::rfc3339")]
    pub reset_time: OffsetDateTime,
    pub limit: u64,
}

impl RateLimitDecision {
    fn fail_open(limit: u64, reset_time: OffsetDateTime) -> Self {
        Self {
            allowed: true,
            remaining: limit,
            reset_time,
            limit,
        }
    }
}

/// End of a window starting now, capped at the latest representable instant.
fn window_end(window_secs: u64) -> OffsetDateTime {
    i64::try_from(window_secs)
        .ok()
        .and_then(|secs| OffsetDateTime::now_utc().checked_add(time::Duration::seconds(secs)))
        .unwrap_or_else(|| PrimitiveDateTime::MAX.assume_utc())
}

impl CacheService {
    /// Count one request against `key` and decide whether it is within `limit`
    /// for the window of `window_secs` seconds.
    ///
    /// The counter and its expiry are updated atomically; the first request of
    /// a window starts the window and later requests never extend it. A window
    /// of 0 is treated as 1 second. When the store is unreachable the request is
    /// allowed with the full limit remaining.
    pub async fn check_rate_limit(&self, key: &str, limit: u64, window_secs: u64) -> RateLimitDecision {
        let window = window_secs.max(1);
        let reset_time = window_end(window);

        if !self.ready_or_skip("check_rate_limit") {
            metrics::record_rate_limit("fail_open");
            return RateLimitDecision::fail_open(limit, reset_time);
        }

        let full = build_key(key, None);
        let current = match self.conn.store().incr_in_window(&full, 1, window).await {
            Ok(n) => u64::try_from(n).unwrap_or(0),
            Err(e) => {
                self.store_failed("check_rate_limit", &full, &e);
                metrics::record_rate_limit("fail_open");
                return RateLimitDecision::fail_open(limit, reset_time);
            }
        };

        let allowed = current <= limit;
        if allowed {
            metrics::record_rate_limit("allowed");
        } else {
            metrics::record_rate_limit("rejected");
            tracing::debug!(key = %full, current, limit, "rate limit exceeded");
        }
        RateLimitDecision {
            allowed,
            remaining: limit.saturating_sub(current),
            reset_time,
            limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::memory_service;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_window_counts_down_then_resets() {
        let (cache, _) = memory_service().await;

        let mut remaining = Vec::new();
        for _ in 0..5 {
            let decision = cache.check_rate_limit("rl:login:10.0.0.1", 5, 10).await;
            assert!(decision.allowed);
            remaining.push(decision.remaining);
        }
        assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

        let sixth = cache.check_rate_limit("rl:login:10.0.0.1", 5, 10).await;
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);
        assert_eq!(sixth.limit, 5);

        tokio::time::advance(Duration::from_secs(10)).await;
        let fresh = cache.check_rate_limit("rl:login:10.0.0.1", 5, 10).await;
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_requests_do_not_extend_window() {
        let (cache, _) = memory_service().await;
        cache.check_rate_limit("rl:api", 2, 10).await;
        tokio::time::advance(Duration::from_secs(9)).await;
        cache.check_rate_limit("rl:api", 2, 10).await;
        assert!(!cache.check_rate_limit("rl:api", 2, 10).await.allowed);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.check_rate_limit("rl:api", 2, 10).await.allowed);
    }

    #[tokio::test]
    async fn test_zero_window_still_expires() {
        let (cache, _) = memory_service().await;
        cache.check_rate_limit("rl:zero", 1, 0).await;
        assert_eq!(cache.get_ttl("rl:zero", None).await, 1);
    }

    #[tokio::test]
    async fn test_huge_window_caps_reset_time() {
        let (cache, _) = memory_service().await;
        let capped = time::PrimitiveDateTime::MAX.assume_utc();

        let first = cache.check_rate_limit("rl:max", 5, u64::MAX).await;
        assert!(first.allowed);
        assert_eq!(first.remaining, 4);
        assert_eq!(first.reset_time, capped);

        let second = cache.check_rate_limit("rl:big", 5, 1_000_000_000_000_000).await;
        assert!(second.allowed);
        assert_eq!(second.reset_time, capped);

        let normal = cache.check_rate_limit("rl:day", 5, 86_400).await;
        assert!(normal.reset_time < capped);
    }

    #[tokio::test]
    async fn test_non_integer_counter_fails_open_and_stays_ready() {
        let (cache, _) = memory_service().await;
        cache.set("rl:corrupt", &"not a number", None, None).await.unwrap();

        let decision = cache.check_rate_limit("rl:corrupt", 3, 60).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 3);
        assert!(cache.is_ready());
    }

    #[tokio::test]
    async fn test_fails_open_when_store_is_down() {
        let (cache, store) = memory_service().await;
        store.set_online(false);
        for _ in 0..10 {
            let decision = cache.check_rate_limit("rl:down", 3, 60).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, 3);
        }
    }
}
