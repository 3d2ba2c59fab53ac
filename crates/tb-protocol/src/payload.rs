//! Binary-safe encoding for `data` payloads
//!
//! Remote output is arbitrary 8-bit data. It travels inside a JSON string as
//! standard padded base64, so every byte round-trips unchanged.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;

use crate::error::ProtocolError;

/// Encode raw bytes for a `data` frame
pub fn encode_payload(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode the `data` field of a `data` frame
pub fn decode_payload(encoded: &str) -> Result<Bytes, ProtocolError> {
    Ok(Bytes::from(STANDARD.decode(encoded)?))
}

/// Serde adapter for `Bytes` fields carried as base64 strings
pub mod base64_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as a base64 string
    pub fn serialize<S>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::encode_payload(data))
    }

    /// Deserialize bytes from a base64 string
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        super::decode_payload(&encoded).map_err(serde::de::Error::custom)
    }
}
