//! Remote shell connector traits
//!
//! The proxy talks to remote machines only through these traits. The SSH
//! implementation lives in the proxy crate; tests substitute scripted fakes.
//!
//! Lifecycle of one attempt:
//!
//! 1. [`RemoteConnector::connect`] authenticates and yields a [`RemoteConnection`]
//! 2. [`RemoteConnection::open_shell`] allocates a pty-backed [`RemoteShell`]
//! 3. The shell is driven with `write`/`resize` and drained with `next_output`
//! 4. `close` on the shell, then `disconnect` on the connection

use async_trait::async_trait;
use bytes::Bytes;
use tb_protocol::TerminalGeometry;

use crate::error::ConnectorError;
use crate::types::{Credentials, PtyRequest};

/// Something that happened on a live shell stream
#[derive(Debug)]
pub enum ShellOutput {
    /// Output bytes (stdout or stderr), in remote order
    Data(Bytes),
    /// Remote process reported its exit status; more output may follow
    ExitStatus(u32),
    /// The shell stream closed
    Closed,
    /// The underlying connection ended without an error
    ConnectionEnded,
    /// The underlying connection failed
    Failed(ConnectorError),
}

/// Opens authenticated connections to remote hosts
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Connect and authenticate with username/password.
    ///
    /// Must fail with `Auth`, `Network` or `Timeout`. The caller bounds the
    /// whole call with its own timeout as well.
    async fn connect(
        &self,
        credentials: Credentials,
    ) -> Result<Box<dyn RemoteConnection>, ConnectorError>;
}

/// An authenticated connection that can host one interactive shell
#[async_trait]
pub trait RemoteConnection: Send {
    /// Allocate a pty and start an interactive shell.
    ///
    /// Fails with `Shell`. The connection stays open on failure; the caller
    /// decides when to disconnect it.
    async fn open_shell(
        &mut self,
        pty: &PtyRequest,
    ) -> Result<Box<dyn RemoteShell>, ConnectorError>;

    /// Tear the connection down. Safe to call more than once.
    async fn disconnect(&mut self);
}

/// A pty-backed interactive shell stream
#[async_trait]
pub trait RemoteShell: Send {
    /// Write raw bytes to the shell's stdin
    async fn write(&mut self, data: &[u8]) -> Result<(), ConnectorError>;

    /// Change the remote pty window size
    async fn resize(&mut self, geometry: TerminalGeometry) -> Result<(), ConnectorError>;

    /// Wait for the next output event. Must be cancel safe.
    async fn next_output(&mut self) -> ShellOutput;

    /// Close the stream. Safe to call more than once.
    async fn close(&mut self);
}
