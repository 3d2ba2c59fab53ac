//! Session coordinator
//!
//! One coordinator per browser connection. It is the only place session
//! state changes: client messages and remote events are both funnelled into
//! a single `select!` loop, so nothing about one session is ever processed
//! concurrently.
//!
//! # Invariants
//!
//! - A remote handle exists if and only if the state is `Connecting` or
//!   `Connected`.
//! - At most one remote handle exists. A new `connect` shuts the previous
//!   attempt down before starting (last attempt wins), and events carrying an
//!   older attempt number are ignored.
//! - Input reaches the remote only while `Connected`.
//! - `Closed` is absorbing and tears the remote down, however often it is
//!   entered.
//! - Frames for the browser wait in the coordinator's outbox, never in an
//!   await inside a handler. While the outbox is non-empty remote events are
//!   not read, but client frames and shutdown still are, so a browser that
//!   stops reading cannot keep the remote connection alive.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tb_core::config::ProxyConfig;
use tb_core::traits::RemoteConnector;
use tb_core::{Credentials, PtyRequest, SessionId, SessionState};
use tb_protocol::{ClientMessage, ServerMessage, SessionStatus, TerminalGeometry};

use super::remote::{RemoteEvent, RemoteEventKind, RemoteHandle};
use crate::transport::{ClientSink, InboundFrame};

/// Capacity of the remote-to-coordinator event channel.
///
/// Remote output waits here while the browser is slow, which in turn
/// throttles reads from the shell.
const REMOTE_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Per-session settings taken from the proxy configuration
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// TERM requested with the pty
    pub term: String,
    /// Geometry used until the browser reports one
    pub initial_geometry: TerminalGeometry,
    /// How long a replaced or closed attempt may take to disconnect
    pub shutdown_grace: Duration,
}

impl SessionSettings {
    /// Build settings from the proxy configuration
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            term: config.term.clone(),
            initial_geometry: config.initial_geometry,
            shutdown_grace: config.shutdown_grace,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&ProxyConfig::default())
    }
}

/// State machine binding one browser channel to at most one remote shell
pub struct SessionCoordinator {
    id: SessionId,
    state: SessionState,
    geometry: TerminalGeometry,
    settings: SessionSettings,
    connector: Arc<dyn RemoteConnector>,
    client: ClientSink,
    outbox: VecDeque<ServerMessage>,
    remote: Option<RemoteHandle>,
    next_attempt: u64,
    events_tx: mpsc::Sender<RemoteEvent>,
    events_rx: mpsc::Receiver<RemoteEvent>,
}

impl SessionCoordinator {
    /// Create a coordinator in the `Disconnected` state
    pub fn new(
        id: SessionId,
        settings: SessionSettings,
        connector: Arc<dyn RemoteConnector>,
        client: ClientSink,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(REMOTE_EVENT_CHANNEL_CAPACITY);

        Self {
            id,
            state: SessionState::Disconnected,
            geometry: settings.initial_geometry,
            settings,
            connector,
            client,
            outbox: VecDeque::new(),
            remote: None,
            next_attempt: 0,
            events_tx,
            events_rx,
        }
    }

    /// Drive the session until the browser channel closes or `shutdown` fires
    pub async fn run<S>(mut self, mut inbound: S, shutdown: CancellationToken)
    where
        S: Stream<Item = InboundFrame> + Unpin,
    {
        loop {
            tokio::select! {
                frame = inbound.next() => match frame {
                    Some(InboundFrame::Message(message)) => self.handle_client(message),
                    Some(InboundFrame::Malformed(e)) => {
                        tracing::debug!("{}: discarding malformed frame: {}", self.id, e);
                    }
                    Some(InboundFrame::Ignored) => {}
                    Some(InboundFrame::Closed) | None => {
                        tracing::debug!("{}: client channel closed", self.id);
                        break;
                    }
                },
                permit = self.client.reserve(), if !self.outbox.is_empty() => match permit {
                    Some(permit) => {
                        if let Some(message) = self.outbox.pop_front() {
                            permit.send(message);
                        }
                    }
                    None => {
                        tracing::debug!(
                            "{}: client writer gone, dropping {} queued frames",
                            self.id,
                            self.outbox.len()
                        );
                        self.outbox.clear();
                    }
                },
                Some(event) = self.events_rx.recv(), if self.outbox.is_empty() => {
                    self.handle_remote(event);
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("{}: closing for shutdown", self.id);
                    break;
                }
            }
        }

        self.close();
    }

    /// Apply one decoded client message
    fn handle_client(&mut self, message: ClientMessage) {
        if self.state == SessionState::Closed {
            return;
        }

        tracing::trace!("{}: client {} in state {}", self.id, message.kind(), self.state);

        match message {
            ClientMessage::Connect(request) => self.start_attempt(request.into()),

            ClientMessage::Input { data } => {
                match (&self.remote, self.state) {
                    (Some(remote), SessionState::Connected) => {
                        remote.write(Bytes::from(data.into_bytes()));
                    }
                    _ => {
                        tracing::trace!(
                            "{}: dropping {} bytes of input while {}",
                            self.id,
                            data.len(),
                            self.state
                        );
                    }
                }
            }

            ClientMessage::Resize(geometry) => {
                self.geometry = geometry;
                if let Some(remote) = &self.remote {
                    remote.resize(geometry);
                }
            }
        }
    }

    /// Apply one event from the current remote attempt
    fn handle_remote(&mut self, event: RemoteEvent) {
        let Some(remote) = self.remote.as_mut() else {
            tracing::trace!("{}: ignoring event from finished attempt {}", self.id, event.attempt);
            return;
        };

        if event.attempt != remote.attempt() {
            tracing::trace!(
                "{}: ignoring event from replaced attempt {} (current {})",
                self.id,
                event.attempt,
                remote.attempt()
            );
            return;
        }

        match event.kind {
            RemoteEventKind::Ready => {
                tracing::debug!("{}: remote authenticated, allocating shell", self.id);
            }

            RemoteEventKind::ShellOpened => {
                remote.mark_shell_open();
                self.set_state(SessionState::Connected);
                self.queue(ServerMessage::status(SessionStatus::Connected));
            }

            RemoteEventKind::Data(data) => {
                if remote.shell_open() {
                    self.queue(ServerMessage::data(data));
                }
            }

            RemoteEventKind::ConnectFailed(e)
            | RemoteEventKind::ShellFailed(e)
            | RemoteEventKind::ConnectionError(e) => {
                self.release_remote();
                self.set_state(SessionState::Disconnected);
                self.queue(ServerMessage::error(e.to_string()));
            }

            RemoteEventKind::StreamClosed | RemoteEventKind::ConnectionEnded => {
                tracing::info!("{}: remote side closed the session", self.id);
                self.release_remote();
                self.set_state(SessionState::Disconnected);
                self.queue(ServerMessage::status(SessionStatus::Disconnected));
            }
        }
    }

    /// Enter `Closed`, tearing down any remote connection. Idempotent.
    fn close(&mut self) {
        self.release_remote();
        if self.state != SessionState::Closed {
            self.set_state(SessionState::Closed);
        }
    }

    fn queue(&mut self, message: ServerMessage) {
        tracing::trace!("{}: queueing {} frame", self.id, message.kind());
        self.outbox.push_back(message);
    }

    fn start_attempt(&mut self, credentials: Credentials) {
        if self.remote.is_some() {
            tracing::info!("{}: new connect replaces the current remote connection", self.id);
            self.release_remote();
        }

        self.next_attempt += 1;
        let attempt = self.next_attempt;

        tracing::info!(
            "{}: connecting to {} (attempt {})",
            self.id,
            credentials.target(),
            attempt
        );

        let pty = PtyRequest::new(self.settings.term.clone(), self.geometry);
        self.remote = Some(RemoteHandle::spawn(
            self.id,
            attempt,
            Arc::clone(&self.connector),
            credentials,
            pty,
            self.events_tx.clone(),
        ));
        self.set_state(SessionState::Connecting);
    }

    fn release_remote(&mut self) {
        if let Some(remote) = self.remote.take() {
            remote.shutdown(self.settings.shutdown_grace);
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::debug!("{}: {} -> {}", self.id, self.state, state);
        }
        self.state = state;

        debug_assert_eq!(
            self.remote.is_some(),
            self.state.holds_remote(),
            "remote handle must exist exactly in Connecting/Connected"
        );
    }
}
