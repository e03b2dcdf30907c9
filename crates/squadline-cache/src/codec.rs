//! Serialization port for cached payloads.
//!
//! Values cross the cache boundary as opaque bytes. Each call site picks the
//! codec it stores with; the service defaults to [`JsonCodec`], which keeps
//! payloads readable by the other (non-Rust) services sharing the store.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;

/// Encodes typed values to bytes and back.
pub trait Codec: Send + Sync + 'static {
    /// Short codec name used in logs and errors.
    const NAME: &'static str;

    fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Vec<u8>, CodecError>;

    fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, CodecError>;
}

/// JSON payloads (`serde_json`).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    const NAME: &'static str = "json";

    fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode {
            key: key.to_string(),
            codec: Self::NAME,
            message: e.to_string(),
        })
    }

    fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
            key: key.to_string(),
            codec: Self::NAME,
            message: e.to_string(),
        })
    }
}

/// MessagePack payloads (`rmp-serde`), for Rust-only consumers of large values.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    const NAME: &'static str = "msgpack";

    fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Vec<u8>, CodecError> {
        // Named encoding so structs survive field reordering between releases.
        rmp_serde::to_vec_named(value).map_err(|e| CodecError::Encode {
            key: key.to_string(),
            codec: Self::NAME,
            message: e.to_string(),
        })
    }

    fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, CodecError> {
        rmp_serde::from_slice(bytes).map_err(|e| CodecError::Decode {
            key: key.to_string(),
            codec: Self::NAME,
            message: e.to_string(),
        })
    }
}
