//! Payload marshaling hooks.
//!
//! The gateway treats payload encoding as a pluggable contract: anything that
//! can turn a serializable value into bytes and back. [`JsonCodec`] is the
//! default, matching what most collaborating services expect on the wire;
//! [`BincodeCodec`] is available when every party is a Rust service and a
//! compact binary format is preferred.
//!
//! A codec failure during publish aborts the call before anything reaches
//! the broker; an empty or garbage payload is never emitted.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors from payload encoding and decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The value could not be encoded.
    #[error("failed to encode payload: {0}")]
    Encode(String),

    /// The bytes could not be decoded into the requested type.
    #[error("failed to decode payload: {0}")]
    Decode(String),
}

/// Marshal/unmarshal hook for event payloads.
///
/// Implementations must be stateless or internally synchronized; one codec
/// instance serves every publish and consume call of a gateway.
pub trait Codec: Send + Sync {
    /// Encode a value into payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if the value cannot be represented in
    /// the codec's format.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Decode payload bytes into a value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the bytes are not a valid encoding
    /// of `T`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// JSON codec, the gateway default.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Bincode codec for all-Rust deployments.
#[derive(Clone, Copy, Debug, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
