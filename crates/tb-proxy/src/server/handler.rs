//! Request handlers
//!
//! `ws_handler` admits the browser, upgrades the connection and runs one
//! session coordinator on it until either side goes away.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::session::{SessionCoordinator, SessionLease};
use crate::state::ProxyState;
use crate::transport::{inbound_frames, run_writer, ClientSink};

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "ok" while the listener is up
    pub status: String,
    /// Number of live browser sessions
    pub sessions: usize,
}

/// Liveness probe
pub async fn health_handler(State(state): State<Arc<ProxyState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        sessions: state.registry.len(),
    })
}

/// Accept a browser terminal connection
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<Arc<ProxyState>>,
) -> Response {
    let lease = match state.registry.admit(peer) {
        Ok(lease) => lease,
        Err(e) => {
            tracing::warn!("Refusing WebSocket from {}: {}", peer, e);
            return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
        }
    };

    tracing::info!("{}: WebSocket accepted from {}", lease.id(), peer);
    ws.on_upgrade(move |socket| serve_session(socket, lease, state))
}

/// Run one session on an upgraded socket
async fn serve_session(socket: WebSocket, lease: SessionLease, state: Arc<ProxyState>) {
    let id = lease.id();
    let (sink, stream) = socket.split();

    let (client, outbound) = ClientSink::new(state.config.outbound_queue);
    let writer = tokio::spawn(run_writer(sink, outbound));

    let coordinator = SessionCoordinator::new(
        id,
        state.session_settings(),
        Arc::clone(&state.connector),
        client,
    );
    coordinator
        .run(inbound_frames(stream), state.shutdown.child_token())
        .await;

    if let Err(e) = writer.await {
        tracing::warn!("{}: writer task failed: {}", id, e);
    }

    drop(lease);
    tracing::info!("{}: session closed", id);
}
