//! Scripted in-memory connector for coordinator tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use tb_core::traits::{RemoteConnection, RemoteConnector, RemoteShell, ShellOutput};
use tb_core::{ConnectorError, Credentials, PtyRequest};
use tb_protocol::TerminalGeometry;

/// Operation observed by the fake remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Connect(String),
    ConnectAbandoned,
    OpenShell(TerminalGeometry),
    Write(Vec<u8>),
    Resize(TerminalGeometry),
    CloseShell,
    Disconnect,
}

/// How the next `connect` behaves
#[derive(Clone, Copy)]
pub enum ConnectBehavior {
    Accept,
    RejectAuth,
    Fail(fn() -> ConnectorError),
    Hang,
}

/// How the next `open_shell` behaves
#[derive(Clone, Copy)]
pub enum ShellBehavior {
    Open,
    Fail,
}

struct Shared {
    ops: Vec<Op>,
    connect: ConnectBehavior,
    shell: ShellBehavior,
    outputs: Vec<mpsc::UnboundedSender<ShellOutput>>,
}

#[derive(Clone)]
pub struct FakeConnector {
    shared: Arc<Mutex<Shared>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                ops: Vec::new(),
                connect: ConnectBehavior::Accept,
                shell: ShellBehavior::Open,
                outputs: Vec::new(),
            })),
        }
    }

    pub fn set_connect(&self, behavior: ConnectBehavior) {
        self.shared.lock().unwrap().connect = behavior;
    }

    pub fn set_shell(&self, behavior: ShellBehavior) {
        self.shared.lock().unwrap().shell = behavior;
    }

    pub fn ops(&self) -> Vec<Op> {
        self.shared.lock().unwrap().ops.clone()
    }

    /// Number of shells opened so far
    pub fn shell_count(&self) -> usize {
        self.shared.lock().unwrap().outputs.len()
    }

    /// Push an output event into the `index`th shell opened
    pub fn emit(&self, index: usize, output: ShellOutput) {
        let shared = self.shared.lock().unwrap();
        shared.outputs[index]
            .send(output)
            .expect("shell already dropped");
    }

    /// Wait until the recorded operations satisfy `done`
    pub async fn wait_for(&self, done: impl Fn(&[Op]) -> bool) {
        let wait = async {
            loop {
                if done(&self.ops()) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };

        if tokio::time::timeout(Duration::from_secs(5), wait).await.is_err() {
            panic!("condition not reached, ops: {:?}", self.ops());
        }
    }

    fn record(shared: &Mutex<Shared>, op: Op) {
        shared.lock().unwrap().ops.push(op);
    }
}

/// Records `ConnectAbandoned` when a hanging connect future is dropped
struct AbandonGuard(Arc<Mutex<Shared>>);

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        FakeConnector::record(&self.0, Op::ConnectAbandoned);
    }
}

#[async_trait]
impl RemoteConnector for FakeConnector {
    async fn connect(
        &self,
        credentials: Credentials,
    ) -> Result<Box<dyn RemoteConnection>, ConnectorError> {
        FakeConnector::record(&self.shared, Op::Connect(credentials.target()));

        let behavior = self.shared.lock().unwrap().connect;
        match behavior {
            ConnectBehavior::Accept => Ok(Box::new(FakeConnection {
                shared: Arc::clone(&self.shared),
                disconnected: false,
            })),
            ConnectBehavior::RejectAuth => Err(ConnectorError::Auth),
            ConnectBehavior::Fail(error) => Err(error()),
            ConnectBehavior::Hang => {
                let _guard = AbandonGuard(Arc::clone(&self.shared));
                std::future::pending().await
            }
        }
    }
}

struct FakeConnection {
    shared: Arc<Mutex<Shared>>,
    disconnected: bool,
}

#[async_trait]
impl RemoteConnection for FakeConnection {
    async fn open_shell(
        &mut self,
        pty: &PtyRequest,
    ) -> Result<Box<dyn RemoteShell>, ConnectorError> {
        FakeConnector::record(&self.shared, Op::OpenShell(pty.geometry));

        let mut shared = self.shared.lock().unwrap();
        match shared.shell {
            ShellBehavior::Fail => Err(ConnectorError::Shell("pty request denied".to_string())),
            ShellBehavior::Open => {
                let (tx, rx) = mpsc::unbounded_channel();
                shared.outputs.push(tx);
                Ok(Box::new(FakeShell {
                    shared: Arc::clone(&self.shared),
                    output: rx,
                    closed: false,
                }))
            }
        }
    }

    async fn disconnect(&mut self) {
        if !self.disconnected {
            self.disconnected = true;
            FakeConnector::record(&self.shared, Op::Disconnect);
        }
    }
}

struct FakeShell {
    shared: Arc<Mutex<Shared>>,
    output: mpsc::UnboundedReceiver<ShellOutput>,
    closed: bool,
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn write(&mut self, data: &[u8]) -> Result<(), ConnectorError> {
        FakeConnector::record(&self.shared, Op::Write(data.to_vec()));
        Ok(())
    }

    async fn resize(&mut self, geometry: TerminalGeometry) -> Result<(), ConnectorError> {
        FakeConnector::record(&self.shared, Op::Resize(geometry));
        Ok(())
    }

    async fn next_output(&mut self) -> ShellOutput {
        match self.output.recv().await {
            Some(output) => output,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            FakeConnector::record(&self.shared, Op::CloseShell);
        }
    }
}
