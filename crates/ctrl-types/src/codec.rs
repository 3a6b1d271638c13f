//! # Codec
//!
//! Bincode encoding for envelopes and payload bodies.

use crate::errors::CodecError;
use crate::messages::Payload;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode any serializable value.
///
/// # Errors
///
/// Returns `CodecError::Encode` if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode a value from bytes.
///
/// # Errors
///
/// Returns `CodecError::Decode` on malformed input.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Encode a typed payload into a signed body.
pub fn encode_payload(payload: &Payload) -> Result<Vec<u8>, CodecError> {
    encode(payload)
}

/// Decode a signed body into a typed payload.
pub fn decode_payload(body: &[u8]) -> Result<Payload, CodecError> {
    decode(body)
}
