//! Proxy configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use tb_protocol::TerminalGeometry;

use super::duration::seconds;
use crate::error::ConfigError;

/// Configuration for the proxy daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Address the WebSocket listener binds to
    pub bind_address: String,

    /// Route that accepts WebSocket upgrades
    pub ws_path: String,

    /// TERM value requested with the remote pty
    pub term: String,

    /// Maximum number of concurrent browser sessions (unbounded when absent)
    pub max_sessions: Option<usize>,

    /// Capacity of each session's outbound frame queue
    pub outbound_queue: usize,

    /// How long a remote connection may take to disconnect before it is aborted
    #[serde(with = "seconds")]
    pub shutdown_grace: Duration,

    /// Pty size used until the browser sends a resize
    pub initial_geometry: TerminalGeometry,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3001".to_string(),
            ws_path: "/".to_string(),
            term: "xterm-256color".to_string(),
            max_sessions: None,
            outbound_queue: 256,
            shutdown_grace: Duration::from_secs(5),
            initial_geometry: TerminalGeometry::default_size(),
        }
    }
}

impl ProxyConfig {
    /// Check values that would make the proxy misbehave at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.term.trim().is_empty() {
            return Err(ConfigError::Invalid("term must not be empty".to_string()));
        }

        if !self.ws_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "ws_path must start with '/': {:?}",
                self.ws_path
            )));
        }

        if self.ws_path == "/health" {
            return Err(ConfigError::Invalid(
                "ws_path must not shadow the /health route".to_string(),
            ));
        }

        if self.outbound_queue == 0 {
            return Err(ConfigError::Invalid(
                "outbound_queue must be at least 1".to_string(),
            ));
        }

        if self.initial_geometry.rows == 0 || self.initial_geometry.cols == 0 {
            return Err(ConfigError::Invalid(
                "initial_geometry rows and cols must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}
