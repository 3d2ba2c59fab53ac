//! Browser channel plumbing
//!
//! Turns raw WebSocket messages into decoded control messages for the
//! coordinator, and drains the coordinator's outbound queue into the socket
//! from a dedicated writer task.

use std::fmt::Display;

use axum::extract::ws::Message as WsMessage;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;

use tb_protocol::{
    decode_client_frame, decode_client_text, encode_server_message, ClientMessage,
    ProtocolError, ServerMessage,
};

/// One frame received from the browser, after decoding
#[derive(Debug)]
pub enum InboundFrame {
    /// A valid control message
    Message(ClientMessage),
    /// Undecodable or unknown frame; dropped without a reply
    Malformed(ProtocolError),
    /// Ping/pong and other frames with no session meaning
    Ignored,
    /// The browser closed the channel
    Closed,
}

/// Decode one WebSocket message
pub fn decode_ws_message(message: WsMessage) -> InboundFrame {
    let decoded = match message {
        WsMessage::Text(text) => decode_client_text(&text),
        WsMessage::Binary(bytes) => decode_client_frame(&bytes),
        WsMessage::Ping(_) | WsMessage::Pong(_) => return InboundFrame::Ignored,
        WsMessage::Close(_) => return InboundFrame::Closed,
    };

    match decoded {
        Ok(message) => InboundFrame::Message(message),
        Err(e) => InboundFrame::Malformed(e),
    }
}

/// Adapt the receiving half of a WebSocket into decoded frames.
///
/// A transport error is treated as the channel closing.
pub fn inbound_frames<S, E>(stream: S) -> impl Stream<Item = InboundFrame> + Unpin
where
    S: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: Display,
{
    stream.map(|result| match result {
        Ok(message) => decode_ws_message(message),
        Err(e) => {
            tracing::debug!("WebSocket receive error: {}", e);
            InboundFrame::Closed
        }
    })
}

/// Outbound half of the browser channel as seen by the coordinator
pub struct ClientSink {
    tx: mpsc::Sender<ServerMessage>,
}

impl ClientSink {
    /// Create a sink and the queue the writer task drains
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Wait for room in the queue.
    ///
    /// Resolves to `None` once the writer is gone. Dropping the future gives
    /// up the slot, so callers can race this against other work.
    pub async fn reserve(&self) -> Option<mpsc::OwnedPermit<ServerMessage>> {
        self.tx.clone().reserve_owned().await.ok()
    }
}

/// Writer task: serialize queued messages onto the socket until either the
/// queue or the socket closes.
pub async fn run_writer<S>(mut sink: S, mut rx: mpsc::Receiver<ServerMessage>)
where
    S: Sink<WsMessage> + Unpin,
    S::Error: Display,
{
    while let Some(message) = rx.recv().await {
        let text = match encode_server_message(&message) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Failed to encode {} frame: {}", message.kind(), e);
                continue;
            }
        };

        if let Err(e) = sink.send(WsMessage::Text(text)).await {
            tracing::debug!("WebSocket send failed: {}", e);
            break;
        }
    }

    let _ = sink.close().await;
}
