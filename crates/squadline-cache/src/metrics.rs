//! Metrics emitted by the cache layer.
//!
//! Uses the `metrics` facade only; the embedding process decides whether and
//! how to export (Prometheus, StatsD, nothing). Without an installed recorder
//! every call is a no-op.

use metrics::{counter, gauge};

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_STORE_ERRORS_TOTAL: &str = "cache_store_errors_total";
    pub const CACHE_CODEC_ERRORS_TOTAL: &str = "cache_codec_errors_total";
    pub const CACHE_KEYS: &str = "cache_keys";
    pub const CACHE_CONNECTION_READY: &str = "cache_connection_ready";
    pub const RATE_LIMIT_DECISIONS_TOTAL: &str = "rate_limit_decisions_total";
}

pub fn record_cache_hit() {
    counter!(names::CACHE_HITS_TOTAL).increment(1);
}

pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

/// Record a failed store round-trip for operation `op` ("get", "set", ...).
pub fn record_store_error(op: &'static str) {
    counter!(names::CACHE_STORE_ERRORS_TOTAL, "op" => op).increment(1);
}

pub fn record_codec_error(op: &'static str) {
    counter!(names::CACHE_CODEC_ERRORS_TOTAL, "op" => op).increment(1);
}

pub fn set_cache_keys(count: u64) {
    gauge!(names::CACHE_KEYS).set(count as f64);
}

pub fn set_connection_ready(ready: bool) {
    gauge!(names::CACHE_CONNECTION_READY).set(if ready { 1.0 } else { 0.0 });
}

/// Record a rate-limit outcome: "allowed", "rejected" or "fail_open".
pub fn record_rate_limit(outcome: &'static str) {
    counter!(names::RATE_LIMIT_DECISIONS_TOTAL, "outcome" => outcome).increment(1);
}
