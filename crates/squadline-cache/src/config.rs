use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheLayerConfig {
    /// Redis connection configuration
    #[serde(default)]
    pub redis: RedisConfig,
    /// Cache behaviour (TTLs, backend selection)
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CacheLayerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis.url.trim().is_empty() {
            return Err(ConfigError::Invalid("redis.url must not be empty".into()));
        }
        if self.redis.pool_size == 0 {
            return Err(ConfigError::Invalid("redis.pool_size must be > 0".into()));
        }
        if self.redis.timeout_ms == 0 {
            return Err(ConfigError::Invalid("redis.timeout_ms must be > 0".into()));
        }
        if self.redis.reconnect_initial_ms == 0
            || self.redis.reconnect_initial_ms > self.redis.reconnect_max_ms
        {
            return Err(ConfigError::Invalid(
                "redis.reconnect_initial_ms must be > 0 and <= redis.reconnect_max_ms".into(),
            ));
        }
        if self.cache.session_ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache.session_ttl_secs must be > 0".into()));
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        Ok(())
    }
}

/// Redis connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection, wait and recycle timeout in milliseconds.
    /// A command that times out is treated like an unreachable store.
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,

    /// First delay before re-probing a lost connection
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    /// Upper bound for the exponential re-probe delay
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

fn default_reconnect_initial_ms() -> u64 {
    1000
}

fn default_reconnect_max_ms() -> u64 {
    60_000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

impl RedisConfig {
    pub fn reconnect_backoff(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.reconnect_initial_ms),
            Duration::from_millis(self.reconnect_max_ms),
        )
    }
}

/// Which store the cache layer runs over.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Shared Redis instance (default)
    #[default]
    Redis,
    /// In-process store, single instance only
    Memory,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Redis => write!(f, "redis"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL in seconds for writes that don't specify one; 0 stores without expiry
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// TTL in seconds for session records
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    #[serde(default)]
    pub backend: StoreBackend,
}

fn default_ttl_secs() -> u64 {
    3600 // 1 hour
}

fn default_session_ttl_secs() -> u64 {
    86_400 // 24 hours
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            session_ttl_secs: default_session_ttl_secs(),
            backend: StoreBackend::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::CacheLayerConfig;
    use crate::error::ConfigError;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default config file looked up in the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "squadline.toml";

    /// Load configuration from an optional TOML file and the environment.
    ///
    /// Precedence, lowest first: built-in defaults, the file, nested
    /// `SQUADLINE__SECTION__FIELD` variables, then the flat `REDIS_URL` and
    /// `CACHE_DEFAULT_TTL` variables shared with the rest of the platform.
    pub fn load_config(path: Option<&str>) -> Result<CacheLayerConfig, ConfigError> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        builder = builder.add_source(
            Environment::with_prefix("SQUADLINE")
                .try_parsing(true)
                .separator("__"),
        );
        builder = builder
            .set_override_option("redis.url", non_empty_env("REDIS_URL"))
            .map_err(|e| ConfigError::Build(e.to_string()))?;
        builder = builder
            .set_override_option("cache.default_ttl_secs", non_empty_env("CACHE_DEFAULT_TTL"))
            .map_err(|e| ConfigError::Build(e.to_string()))?;

        let cfg = builder
            .build()
            .map_err(|e| ConfigError::Build(e.to_string()))?;
        let merged: CacheLayerConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::Deserialize(e.to_string()))?;
        merged.validate()?;
        Ok(merged)
    }

    fn non_empty_env(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults() {
        let cfg = CacheLayerConfig::default();
        assert_eq!(cfg.redis.url, "redis://localhost:6379");
        assert_eq!(cfg.cache.default_ttl_secs, 3600);
        assert_eq!(cfg.cache.session_ttl_secs, 86_400);
        assert_eq!(cfg.cache.backend, StoreBackend::Redis);
        assert_ok!(cfg.validate());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut cfg = CacheLayerConfig::default();
        cfg.redis.pool_size = 0;
        assert_err!(cfg.validate());

        let mut cfg = CacheLayerConfig::default();
        cfg.redis.reconnect_initial_ms = 120_000;
        assert_err!(cfg.validate());

        let mut cfg = CacheLayerConfig::default();
        cfg.logging.level = "loud".into();
        assert_err!(cfg.validate());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[redis]
url = "redis://cache.internal:6380"
pool_size = 4

[cache]
default_ttl_secs = 120
backend = "memory"
"#
        )
        .unwrap();

        let cfg = loader::load_config(file.path().to_str()).unwrap();
        assert_eq!(cfg.redis.pool_size, 4);
        assert_eq!(cfg.cache.backend, StoreBackend::Memory);
        // Unset fields keep their defaults.
        assert_eq!(cfg.cache.session_ttl_secs, 86_400);
        assert_eq!(cfg.redis.timeout_ms, 5000);
        // Flat env overrides win when present; otherwise the file value stands.
        if std::env::var("REDIS_URL").map(|v| v.trim().is_empty()).unwrap_or(true) {
            assert_eq!(cfg.redis.url, "redis://cache.internal:6380");
        }
    }
}
