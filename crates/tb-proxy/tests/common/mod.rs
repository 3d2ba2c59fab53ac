//! Shared fixtures for proxy integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use tb_core::config::ProxyConfig;
use tb_core::traits::{RemoteConnection, RemoteConnector, RemoteShell, ShellOutput};
use tb_core::{ConnectorError, Credentials, PtyRequest};
use tb_protocol::TerminalGeometry;
use tb_proxy::{ProxyServer, ProxyState};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Password the echo connector rejects
pub const BAD_PASSWORD: &str = "wrong";

/// Operation observed by the echo remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Connect(String),
    Write(Vec<u8>),
    Resize(TerminalGeometry),
    Disconnect,
}

#[derive(Default)]
struct Shared {
    ops: Vec<Op>,
    shells: Vec<mpsc::UnboundedSender<ShellOutput>>,
}

/// Connector whose shells echo every write back as output
#[derive(Clone, Default)]
pub struct EchoConnector {
    shared: Arc<Mutex<Shared>>,
}

impl EchoConnector {
    pub fn ops(&self) -> Vec<Op> {
        self.shared.lock().unwrap().ops.clone()
    }

    /// Push output into the most recently opened shell
    pub fn emit(&self, output: ShellOutput) {
        let shared = self.shared.lock().unwrap();
        shared
            .shells
            .last()
            .expect("no shell open")
            .send(output)
            .unwrap();
    }

    pub async fn wait_for(&self, done: impl Fn(&[Op]) -> bool) {
        let wait = async {
            while !done(&self.ops()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        if tokio::time::timeout(Duration::from_secs(5), wait).await.is_err() {
            panic!("condition not reached, ops: {:?}", self.ops());
        }
    }

    fn record(&self, op: Op) {
        self.shared.lock().unwrap().ops.push(op);
    }
}

#[async_trait]
impl RemoteConnector for EchoConnector {
    async fn connect(
        &self,
        credentials: Credentials,
    ) -> Result<Box<dyn RemoteConnection>, ConnectorError> {
        self.record(Op::Connect(credentials.target()));
        if credentials.password == BAD_PASSWORD {
            return Err(ConnectorError::Auth);
        }
        Ok(Box::new(EchoConnection {
            connector: self.clone(),
            disconnected: false,
        }))
    }
}

struct EchoConnection {
    connector: EchoConnector,
    disconnected: bool,
}

#[async_trait]
impl RemoteConnection for EchoConnection {
    async fn open_shell(
        &mut self,
        _pty: &PtyRequest,
    ) -> Result<Box<dyn RemoteShell>, ConnectorError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connector
            .shared
            .lock()
            .unwrap()
            .shells
            .push(tx.clone());

        Ok(Box::new(EchoShell {
            connector: self.connector.clone(),
            tx,
            rx,
        }))
    }

    async fn disconnect(&mut self) {
        if !self.disconnected {
            self.disconnected = true;
            self.connector.record(Op::Disconnect);
        }
    }
}

struct EchoShell {
    connector: EchoConnector,
    tx: mpsc::UnboundedSender<ShellOutput>,
    rx: mpsc::UnboundedReceiver<ShellOutput>,
}

#[async_trait]
impl RemoteShell for EchoShell {
    async fn write(&mut self, data: &[u8]) -> Result<(), ConnectorError> {
        self.connector.record(Op::Write(data.to_vec()));
        let _ = self
            .tx
            .send(ShellOutput::Data(Bytes::copy_from_slice(data)));
        Ok(())
    }

    async fn resize(&mut self, geometry: TerminalGeometry) -> Result<(), ConnectorError> {
        self.connector.record(Op::Resize(geometry));
        Ok(())
    }

    async fn next_output(&mut self) -> ShellOutput {
        match self.rx.recv().await {
            Some(output) => output,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {}
}

/// A proxy listening on an ephemeral port
pub struct TestProxy {
    pub addr: SocketAddr,
    pub state: Arc<ProxyState>,
    pub cancel: CancellationToken,
    task: JoinHandle<anyhow::Result<()>>,
}

impl TestProxy {
    pub async fn start(config: ProxyConfig, connector: Arc<dyn RemoteConnector>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();

        let state = Arc::new(ProxyState::with_connector(config, connector, cancel.clone()));
        let server = ProxyServer::new(Arc::clone(&state));
        let task = tokio::spawn(async move { server.serve(listener).await });

        Self {
            addr,
            state,
            cancel,
            task,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}{}", self.addr, self.state.config.ws_path)
    }

    pub async fn client(&self) -> Client {
        let (client, _) = tokio_tungstenite::connect_async(self.url()).await.unwrap();
        client
    }

    /// Wait until no sessions are registered
    pub async fn wait_until_idle(&self) {
        let wait = async {
            while !self.state.registry.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("sessions still registered");
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

pub fn connect_frame(password: &str) -> Message {
    Message::Text(
        serde_json::json!({
            "type": "connect",
            "host": "10.0.0.5",
            "port": 22,
            "username": "root",
            "password": password,
        })
        .to_string(),
    )
}

pub async fn send_json(client: &mut Client, value: Value) {
    client.send(Message::Text(value.to_string())).await.unwrap();
}

/// Next text frame from the proxy, parsed as JSON
pub async fn recv_json(client: &mut Client) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .unwrap();

        match message {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}
