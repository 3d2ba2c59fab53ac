//! Frame codec for control messages
//!
//! One WebSocket message carries exactly one control message. Decoding is
//! split into a schema-free pass (object, `type` present and known) and a
//! typed pass, so callers can tell a garbled frame from an unknown one.

use serde_json::Value;

use crate::error::ProtocolError;
use crate::message::{ClientMessage, ServerMessage};

/// Message types a client may send
const CLIENT_TYPES: [&str; 3] = ["connect", "input", "resize"];

/// Decode a text frame from the browser
pub fn decode_client_text(text: &str) -> Result<ClientMessage, ProtocolError> {
    let value: Value = serde_json::from_str(text)?;

    let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;
    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;

    if !CLIENT_TYPES.contains(&kind) {
        return Err(ProtocolError::UnknownType(kind.to_string()));
    }

    Ok(serde_json::from_value(value)?)
}

/// Decode a binary frame from the browser (UTF-8 JSON, same schema as text)
pub fn decode_client_frame(bytes: &[u8]) -> Result<ClientMessage, ProtocolError> {
    let text = std::str::from_utf8(bytes)?;
    decode_client_text(text)
}

/// Encode a message for the browser as a text frame
pub fn encode_server_message(message: &ServerMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}
