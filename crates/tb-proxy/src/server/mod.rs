//! WebSocket server implementation

mod handler;
mod listener;

pub use handler::{health_handler, ws_handler, HealthResponse};
pub use listener::ProxyServer;
