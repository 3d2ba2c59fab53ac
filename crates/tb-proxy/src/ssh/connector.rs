//! SSH implementation of the remote connector
//!
//! Password-authenticated client connections with one pty-backed
//! interactive shell each.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use russh::client::{self, Config, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;

use tb_core::traits::{RemoteConnection, RemoteConnector, RemoteShell, ShellOutput};
use tb_core::{ConnectorError, Credentials, PtyRequest};
use tb_protocol::TerminalGeometry;

/// How long to wait for the server to answer a pty or shell request
const CHANNEL_REPLY_TIMEOUT: Duration = Duration::from_secs(15);

/// Opens SSH connections to arbitrary hosts
pub struct SshConnector {
    config: Arc<Config>,
}

impl SshConnector {
    /// Create a connector with the default client configuration
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a connector with a custom client configuration
    pub fn with_config(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn connect(
        &self,
        credentials: Credentials,
    ) -> Result<Box<dyn RemoteConnection>, ConnectorError> {
        let target = credentials.target();
        let handler = HostKeyLogger {
            target: target.clone(),
        };

        tracing::debug!("Connecting to {}", target);
        let mut handle = client::connect(
            Arc::clone(&self.config),
            (credentials.host.as_str(), credentials.port),
            handler,
        )
        .await
        .map_err(|e| ConnectorError::Network(e.to_string()))?;

        let Credentials {
            username, password, ..
        } = credentials;

        let authenticated = handle
            .authenticate_password(username, password)
            .await
            .map_err(|e| ConnectorError::Network(e.to_string()))?;

        if !authenticated {
            tracing::debug!("Password rejected by {}", target);
            let _ = handle
                .disconnect(Disconnect::ByApplication, "authentication failed", "en")
                .await;
            return Err(ConnectorError::Auth);
        }

        Ok(Box::new(SshConnection {
            handle: Some(handle),
            target,
        }))
    }
}

/// Client handler that accepts any host key and logs its fingerprint
struct HostKeyLogger {
    target: String,
}

#[async_trait]
impl client::Handler for HostKeyLogger {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::debug!(
            "Host key for {}: {}",
            self.target,
            server_public_key.fingerprint()
        );
        Ok(true)
    }
}

/// An authenticated SSH connection
pub struct SshConnection {
    handle: Option<Handle<HostKeyLogger>>,
    target: String,
}

#[async_trait]
impl RemoteConnection for SshConnection {
    async fn open_shell(
        &mut self,
        pty: &PtyRequest,
    ) -> Result<Box<dyn RemoteShell>, ConnectorError> {
        let handle = self.handle.as_ref().ok_or(ConnectorError::Closed)?;

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| ConnectorError::Shell(format!("failed to open channel: {}", e)))?;

        let mut shell = SshShell {
            channel,
            pending: VecDeque::new(),
            closed: false,
        };

        let geometry = pty.geometry;
        shell
            .channel
            .request_pty(
                true,
                &pty.term,
                geometry.cols,
                geometry.rows,
                geometry.width,
                geometry.height,
                &[],
            )
            .await
            .map_err(|e| ConnectorError::Shell(format!("pty request failed: {}", e)))?;
        shell.await_reply("pty").await?;

        shell
            .channel
            .request_shell(true)
            .await
            .map_err(|e| ConnectorError::Shell(format!("shell request failed: {}", e)))?;
        shell.await_reply("shell").await?;

        tracing::debug!(
            "Shell open on {} ({}x{}, {})",
            self.target,
            geometry.cols,
            geometry.rows,
            pty.term
        );

        Ok(Box::new(shell))
    }

    async fn disconnect(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle
                .disconnect(Disconnect::ByApplication, "session closed", "en")
                .await
            {
                tracing::debug!("Disconnect from {} failed: {}", self.target, e);
            }
        }
    }
}

/// A pty-backed shell on an SSH session channel
pub struct SshShell {
    channel: Channel<Msg>,
    /// Output that arrived while waiting for a request reply
    pending: VecDeque<Bytes>,
    closed: bool,
}

impl SshShell {
    /// Wait for the server to accept or refuse the last channel request
    async fn await_reply(&mut self, request: &str) -> Result<(), ConnectorError> {
        let wait = async {
            loop {
                match self.channel.wait().await {
                    Some(ChannelMsg::Success) => return Ok(()),
                    Some(ChannelMsg::Failure) => {
                        return Err(ConnectorError::Shell(format!("{} request denied", request)))
                    }
                    Some(ChannelMsg::Data { data }) => {
                        self.pending.push_back(Bytes::copy_from_slice(&data));
                    }
                    Some(ChannelMsg::ExtendedData { data, .. }) => {
                        self.pending.push_back(Bytes::copy_from_slice(&data));
                    }
                    Some(ChannelMsg::Eof | ChannelMsg::Close) | None => {
                        return Err(ConnectorError::Shell(format!(
                            "channel closed during {} request",
                            request
                        )))
                    }
                    Some(_) => {}
                }
            }
        };

        tokio::time::timeout(CHANNEL_REPLY_TIMEOUT, wait)
            .await
            .map_err(|_| ConnectorError::Shell(format!("no reply to {} request", request)))?
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn write(&mut self, data: &[u8]) -> Result<(), ConnectorError> {
        self.channel
            .data(data)
            .await
            .map_err(|e| ConnectorError::Network(e.to_string()))
    }

    async fn resize(&mut self, geometry: TerminalGeometry) -> Result<(), ConnectorError> {
        self.channel
            .window_change(geometry.cols, geometry.rows, geometry.width, geometry.height)
            .await
            .map_err(|e| ConnectorError::Network(e.to_string()))
    }

    async fn next_output(&mut self) -> ShellOutput {
        if let Some(data) = self.pending.pop_front() {
            return ShellOutput::Data(data);
        }

        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    return ShellOutput::Data(Bytes::copy_from_slice(&data));
                }
                // stderr shares the terminal with stdout
                Some(ChannelMsg::ExtendedData { data, .. }) => {
                    return ShellOutput::Data(Bytes::copy_from_slice(&data));
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    return ShellOutput::ExitStatus(exit_status);
                }
                Some(ChannelMsg::Eof) => {}
                Some(ChannelMsg::Close) => return ShellOutput::Closed,
                Some(_) => {}
                None => return ShellOutput::ConnectionEnded,
            }
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.channel.close().await;
        }
    }
}
