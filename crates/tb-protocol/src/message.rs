//! Message types for the termbridge control protocol
//!
//! Every frame on the WebSocket is one JSON object whose `type` field
//! selects the schema.
//!
//! # Message Flow
//!
//! Typical sequence for a session:
//!
//! 1. Browser opens the socket and sends `connect` with the target and credentials
//! 2. Proxy answers with `status: connected` once the remote shell exists,
//!    or with a single `error` if the attempt failed
//! 3. Terminal I/O: `input` flows browser to proxy, `data` flows back
//! 4. Window resize: `resize` from the browser at any time
//! 5. Remote end closes: proxy sends `status: disconnected`
//!
//! `data` payloads are base64 so arbitrary remote bytes survive the trip
//! through a JSON string.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};

/// Port used when the client omits one or sends something unparsable
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Terminal viewport geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalGeometry {
    /// Number of rows
    pub rows: u32,
    /// Number of columns
    pub cols: u32,
    /// Viewport height in pixels (0 when unknown)
    #[serde(default)]
    pub height: u32,
    /// Viewport width in pixels (0 when unknown)
    #[serde(default)]
    pub width: u32,
}

impl TerminalGeometry {
    /// Create a geometry with no pixel dimensions
    pub fn new(rows: u32, cols: u32) -> Self {
        Self {
            rows,
            cols,
            height: 0,
            width: 0,
        }
    }

    /// Default terminal size (24x80)
    pub fn default_size() -> Self {
        Self::new(24, 80)
    }
}

impl Default for TerminalGeometry {
    fn default() -> Self {
        Self::default_size()
    }
}

/// Request to open a remote shell
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// Remote host name or address
    pub host: String,
    /// Remote SSH port
    #[serde(default = "default_port", deserialize_with = "lenient_port")]
    pub port: u16,
    /// Login name
    pub username: String,
    /// Login password
    #[serde(default)]
    pub password: String,
}

impl ConnectRequest {
    /// `host:port` string suitable for logs
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// Accept a port as a number or a numeric string, falling back to 22
fn lenient_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPort {
        Number(u64),
        Text(String),
        Other(serde::de::IgnoredAny),
    }

    let port = match RawPort::deserialize(deserializer)? {
        RawPort::Number(n) => u16::try_from(n).ok(),
        RawPort::Text(s) => s.trim().parse::<u16>().ok(),
        RawPort::Other(_) => None,
    };

    Ok(port.filter(|p| *p != 0).unwrap_or(DEFAULT_SSH_PORT))
}

/// Messages sent by the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Establish (or re-establish) the remote session
    Connect(ConnectRequest),

    /// Keystrokes for the remote shell
    Input {
        /// Text whose UTF-8 bytes are written verbatim
        data: String,
    },

    /// Viewport geometry change
    Resize(TerminalGeometry),
}

impl ClientMessage {
    /// Wire name of this message, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Connect(_) => "connect",
            ClientMessage::Input { .. } => "input",
            ClientMessage::Resize(_) => "resize",
        }
    }
}

/// Session lifecycle notification values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Remote shell is ready for input
    Connected,
    /// Remote side went away
    Disconnected,
}

/// Encoding of the `data` field in server `data` frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    /// RFC 4648 standard alphabet with padding
    #[default]
    Base64,
}

/// Messages sent to the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Lifecycle notification
    Status {
        /// New status
        status: SessionStatus,
    },

    /// The current connection attempt or session failed
    Error {
        /// Human-readable description
        message: String,
    },

    /// Output bytes from the remote shell
    Data {
        /// Raw bytes, base64 on the wire
        #[serde(with = "crate::payload::base64_bytes")]
        data: Bytes,
        /// How `data` is encoded
        #[serde(default)]
        encoding: PayloadEncoding,
    },
}

impl ServerMessage {
    /// `status` frame
    pub fn status(status: SessionStatus) -> Self {
        ServerMessage::Status { status }
    }

    /// `error` frame
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// `data` frame carrying raw remote output
    pub fn data(data: impl Into<Bytes>) -> Self {
        ServerMessage::Data {
            data: data.into(),
            encoding: PayloadEncoding::Base64,
        }
    }

    /// Wire name of this message, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Status { .. } => "status",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Data { .. } => "data",
        }
    }
}
