//! Core domain types

use std::fmt;

use tb_protocol::{ConnectRequest, TerminalGeometry};

/// Identifier for one accepted browser connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Create a new session ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Session lifecycle state
///
/// ```text
/// Disconnected --connect--> Connecting --shell ready--> Connected
///      ^                        |                          |
///      +------- failure --------+------- remote closed ----+
///
/// any state --client channel closed--> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No remote connection
    Disconnected,
    /// Remote connect or shell allocation in flight
    Connecting,
    /// Shell stream is live
    Connected,
    /// Client channel closed; absorbing
    Closed,
}

impl SessionState {
    /// Whether a remote handle must exist in this state
    pub fn holds_remote(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Connected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Login material for one connect attempt.
///
/// Moved into the attempt and dropped once authentication finishes.
/// `Debug` never prints the username or password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// `host:port` string suitable for logs
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

impl From<ConnectRequest> for Credentials {
    fn from(req: ConnectRequest) -> Self {
        Self {
            host: req.host,
            port: req.port,
            username: req.username,
            password: req.password,
        }
    }
}

/// Parameters for the interactive pty on the remote side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    /// TERM value announced to the remote
    pub term: String,
    /// Initial window geometry
    pub geometry: TerminalGeometry,
}

impl PtyRequest {
    /// Create a pty request
    pub fn new(term: impl Into<String>, geometry: TerminalGeometry) -> Self {
        Self {
            term: term.into(),
            geometry,
        }
    }
}
