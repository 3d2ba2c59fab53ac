//! tb-protocol: Control protocol for termbridge sessions
//!
//! This crate defines the JSON messages exchanged between the browser
//! terminal and the proxy over a single WebSocket, one message per frame.

pub mod codec;
pub mod error;
pub mod message;
pub mod payload;

pub use codec::{decode_client_frame, decode_client_text, encode_server_message};
pub use error::ProtocolError;
pub use message::{
    ClientMessage, ConnectRequest, PayloadEncoding, ServerMessage, SessionStatus,
    TerminalGeometry, DEFAULT_SSH_PORT,
};
