//! Per-attempt remote task
//!
//! Every `connect` from the browser spawns one task that owns the remote
//! connection and its shell stream for the lifetime of that attempt. The
//! coordinator talks to it with [`ShellCommand`]s and hears back through
//! [`RemoteEvent`]s tagged with the attempt number, so events from an attempt
//! that has since been replaced can be recognised and discarded.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tb_core::traits::{RemoteConnection, RemoteConnector, RemoteShell, ShellOutput};
use tb_core::{ConnectorError, Credentials, PtyRequest, SessionId};
use tb_protocol::TerminalGeometry;

/// Upper bound on connecting and authenticating to the remote host
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Commands from the coordinator to a remote task
#[derive(Debug)]
pub enum ShellCommand {
    /// Bytes for the shell's stdin
    Write(Bytes),
    /// New pty window size
    Resize(TerminalGeometry),
    /// Tear the attempt down
    Close,
}

/// Event reported by a remote task
#[derive(Debug)]
pub struct RemoteEvent {
    /// Attempt that produced the event
    pub attempt: u64,
    /// What happened
    pub kind: RemoteEventKind,
}

/// Kinds of remote events
#[derive(Debug)]
pub enum RemoteEventKind {
    /// Authentication succeeded
    Ready,
    /// Pty-backed shell stream allocated
    ShellOpened,
    /// Connect, authentication or timeout failure
    ConnectFailed(ConnectorError),
    /// Shell allocation failed; the connection is still open
    ShellFailed(ConnectorError),
    /// Output from the shell
    Data(Bytes),
    /// Shell stream closed
    StreamClosed,
    /// Connection ended gracefully from the remote side
    ConnectionEnded,
    /// Connection failed after the shell was up
    ConnectionError(ConnectorError),
}

/// Owning handle to one remote attempt.
///
/// Dropping the handle closes the command channel, which the task treats
/// as a close request.
pub struct RemoteHandle {
    attempt: u64,
    commands: mpsc::UnboundedSender<ShellCommand>,
    task: JoinHandle<()>,
    shell_open: bool,
}

impl RemoteHandle {
    /// Spawn the task for a new attempt
    pub fn spawn(
        session: SessionId,
        attempt: u64,
        connector: Arc<dyn RemoteConnector>,
        credentials: Credentials,
        pty: PtyRequest,
        events: mpsc::Sender<RemoteEvent>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let attempt_task = RemoteAttempt {
                session,
                attempt,
                events,
                commands: command_rx,
            };
            attempt_task.run(connector, credentials, pty).await;
        });

        Self {
            attempt,
            commands,
            task,
            shell_open: false,
        }
    }

    /// Attempt number this handle belongs to
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Whether the shell stream has been allocated
    pub fn shell_open(&self) -> bool {
        self.shell_open
    }

    pub(crate) fn mark_shell_open(&mut self) {
        self.shell_open = true;
    }

    /// Queue bytes for the shell. Dropped if the task has already ended.
    pub fn write(&self, data: Bytes) {
        let _ = self.commands.send(ShellCommand::Write(data));
    }

    /// Queue a window size change. Before the shell exists this only
    /// updates the size the pty will be requested with.
    pub fn resize(&self, geometry: TerminalGeometry) {
        let _ = self.commands.send(ShellCommand::Resize(geometry));
    }

    /// Ask the task to disconnect, aborting it if it has not finished
    /// within `grace`.
    pub fn shutdown(self, grace: Duration) {
        let _ = self.commands.send(ShellCommand::Close);

        let mut task = self.task;
        if task.is_finished() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let attempt = self.attempt;
                runtime.spawn(async move {
                    if tokio::time::timeout(grace, &mut task).await.is_err() {
                        tracing::warn!(
                            "Remote attempt {} did not disconnect within {:?}, aborting",
                            attempt,
                            grace
                        );
                        task.abort();
                    }
                });
            }
            Err(_) => task.abort(),
        }
    }
}

/// State owned by the spawned task
struct RemoteAttempt {
    session: SessionId,
    attempt: u64,
    events: mpsc::Sender<RemoteEvent>,
    commands: mpsc::UnboundedReceiver<ShellCommand>,
}

impl RemoteAttempt {
    /// Report an event. Returns false once the coordinator is gone.
    async fn emit(&self, kind: RemoteEventKind) -> bool {
        self.events
            .send(RemoteEvent {
                attempt: self.attempt,
                kind,
            })
            .await
            .is_ok()
    }

    async fn run(
        mut self,
        connector: Arc<dyn RemoteConnector>,
        credentials: Credentials,
        mut pty: PtyRequest,
    ) {
        let remote = credentials.target();

        let Some(mut connection) = self.connect(connector, credentials, &mut pty).await else {
            return;
        };

        tracing::info!("{}: authenticated to {}", self.session, remote);
        if !self.emit(RemoteEventKind::Ready).await {
            connection.disconnect().await;
            return;
        }

        let Some(shell) = self.open_shell(connection.as_mut(), &pty).await else {
            connection.disconnect().await;
            return;
        };

        self.pump(shell, connection).await;
        tracing::debug!("{}: remote attempt {} finished", self.session, self.attempt);
    }

    /// Connect phase, bounded by [`CONNECT_TIMEOUT`] and cancellable by `Close`.
    async fn connect(
        &mut self,
        connector: Arc<dyn RemoteConnector>,
        credentials: Credentials,
        pty: &mut PtyRequest,
    ) -> Option<Box<dyn RemoteConnection>> {
        let remote = credentials.target();
        let connect = tokio::time::timeout(CONNECT_TIMEOUT, connector.connect(credentials));
        tokio::pin!(connect);

        let result = loop {
            tokio::select! {
                result = &mut connect => break result,
                command = self.commands.recv() => match command {
                    Some(ShellCommand::Resize(geometry)) => pty.geometry = geometry,
                    Some(ShellCommand::Write(_)) => {}
                    Some(ShellCommand::Close) | None => {
                        tracing::debug!("{}: connect to {} cancelled", self.session, remote);
                        return None;
                    }
                },
            }
        };

        let error = match result {
            Ok(Ok(connection)) => return Some(connection),
            Ok(Err(e)) => e,
            Err(_) => ConnectorError::Timeout(CONNECT_TIMEOUT),
        };

        tracing::warn!("{}: connect to {} failed: {}", self.session, remote, error);
        self.emit(RemoteEventKind::ConnectFailed(error)).await;
        None
    }

    /// Shell allocation phase. On failure the connection is left open until
    /// the coordinator sends `Close`.
    async fn open_shell(
        &mut self,
        connection: &mut dyn RemoteConnection,
        pty: &PtyRequest,
    ) -> Option<Box<dyn RemoteShell>> {
        let mut pending_resize = None;

        let opened = {
            let open = connection.open_shell(pty);
            tokio::pin!(open);

            loop {
                tokio::select! {
                    result = &mut open => break Some(result),
                    command = self.commands.recv() => match command {
                        Some(ShellCommand::Resize(geometry)) => pending_resize = Some(geometry),
                        Some(ShellCommand::Write(_)) => {}
                        Some(ShellCommand::Close) | None => break None,
                    },
                }
            }
        };

        match opened? {
            Ok(mut shell) => {
                if let Some(geometry) = pending_resize {
                    if let Err(e) = shell.resize(geometry).await {
                        tracing::debug!("{}: deferred resize failed: {}", self.session, e);
                    }
                }

                if self.emit(RemoteEventKind::ShellOpened).await {
                    Some(shell)
                } else {
                    shell.close().await;
                    None
                }
            }
            Err(e) => {
                tracing::warn!("{}: shell allocation failed: {}", self.session, e);
                if self.emit(RemoteEventKind::ShellFailed(e)).await {
                    // The coordinator owns the decision to disconnect
                    while let Some(command) = self.commands.recv().await {
                        if matches!(command, ShellCommand::Close) {
                            break;
                        }
                    }
                }
                None
            }
        }
    }

    /// Streaming phase: forward output and apply commands until either side ends.
    async fn pump(
        &mut self,
        mut shell: Box<dyn RemoteShell>,
        mut connection: Box<dyn RemoteConnection>,
    ) {
        loop {
            tokio::select! {
                output = shell.next_output() => match output {
                    ShellOutput::Data(data) => {
                        tracing::trace!("{}: {} bytes from remote", self.session, data.len());
                        if !self.emit(RemoteEventKind::Data(data)).await {
                            break;
                        }
                    }
                    ShellOutput::ExitStatus(code) => {
                        tracing::info!("{}: remote shell exited with status {}", self.session, code);
                    }
                    ShellOutput::Closed => {
                        self.emit(RemoteEventKind::StreamClosed).await;
                        break;
                    }
                    ShellOutput::ConnectionEnded => {
                        self.emit(RemoteEventKind::ConnectionEnded).await;
                        break;
                    }
                    ShellOutput::Failed(e) => {
                        tracing::warn!("{}: remote connection failed: {}", self.session, e);
                        self.emit(RemoteEventKind::ConnectionError(e)).await;
                        break;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(ShellCommand::Write(data)) => {
                        if let Err(e) = shell.write(&data).await {
                            tracing::warn!("{}: write to remote failed: {}", self.session, e);
                            self.emit(RemoteEventKind::ConnectionError(e)).await;
                            break;
                        }
                    }
                    Some(ShellCommand::Resize(geometry)) => {
                        if let Err(e) = shell.resize(geometry).await {
                            tracing::debug!("{}: resize failed: {}", self.session, e);
                        }
                    }
                    Some(ShellCommand::Close) | None => break,
                },
            }
        }

        shell.close().await;
        connection.disconnect().await;
    }
}
