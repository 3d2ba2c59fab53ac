//! Protocol error types

use thiserror::Error;

/// Errors that can occur while decoding or encoding control frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame is not valid JSON or does not match the selected schema
    #[error("Invalid frame: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Frame is valid JSON but not an object
    #[error("Frame is not a JSON object")]
    NotAnObject,

    /// Frame has no string `type` field
    #[error("Frame has no `type` field")]
    MissingType,

    /// Frame names a message type this side does not accept
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// Binary frame is not UTF-8 text
    #[error("Frame is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Data payload is not valid base64
    #[error("Invalid data payload: {0}")]
    InvalidPayload(#[from] base64::DecodeError),
}
