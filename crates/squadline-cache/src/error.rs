//! Error types for the cache layer.
//!
//! Only [`CodecError`] and [`ConfigError`] ever reach callers of the public
//! service. [`StoreError`] stays behind the store port: the service logs it
//! and falls back to the operation's safe default.

/// Errors raised by a [`KeyValueStore`](crate::store::KeyValueStore) implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached (pool exhausted, I/O error, timeout, refused).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store was reached but rejected the command.
    #[error("store command failed: {0}")]
    Command(String),

    /// The store has been closed by [`close`](crate::store::KeyValueStore::close).
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Whether this error means the link itself is down, as opposed to a single
    /// rejected command.
    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Closed)
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Command(e.to_string())
        }
    }
}

impl From<deadpool_redis::PoolError> for StoreError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        match e {
            deadpool_redis::PoolError::Closed => StoreError::Closed,
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Type alias for results produced by the store port.
pub type StoreResult<T> = Result<T, StoreError>;

/// A cached payload could not be encoded or decoded.
///
/// Kept separate from a cache miss: a hit whose bytes do not decode into the
/// requested type is reported through this channel instead of as `None`.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode value for key {key} ({codec}): {message}")]
    Encode {
        key: String,
        codec: &'static str,
        message: String,
    },

    #[error("failed to decode value for key {key} ({codec}): {message}")]
    Decode {
        key: String,
        codec: &'static str,
        message: String,
    },
}

impl CodecError {
    /// The fully-qualified key the failing payload belongs to.
    pub fn key(&self) -> &str {
        match self {
            CodecError::Encode { key, .. } | CodecError::Decode { key, .. } => key,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Build(String),

    #[error("config deserialize error: {0}")]
    Deserialize(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
