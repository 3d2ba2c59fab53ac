//! tb-proxy: WebSocket to SSH terminal proxy
//!
//! Each browser WebSocket gets its own session coordinator, which owns at
//! most one remote SSH shell at a time and relays keystrokes, output and
//! window size changes between the two.

pub mod server;
pub mod session;
pub mod ssh;
pub mod state;
pub mod transport;

pub use server::ProxyServer;
pub use session::{SessionCoordinator, SessionRegistry, SessionSettings};
pub use ssh::SshConnector;
pub use state::ProxyState;
