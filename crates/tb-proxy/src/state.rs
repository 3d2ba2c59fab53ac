//! Global proxy state

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tb_core::config::ProxyConfig;
use tb_core::traits::RemoteConnector;

use crate::session::{SessionRegistry, SessionSettings};
use crate::ssh::SshConnector;

/// Global state shared by every browser connection
pub struct ProxyState {
    /// Configuration
    pub config: ProxyConfig,
    /// Live sessions
    pub registry: Arc<SessionRegistry>,
    /// Opens remote shells
    pub connector: Arc<dyn RemoteConnector>,
    /// Cancelled when the proxy shuts down
    pub shutdown: CancellationToken,
}

impl ProxyState {
    /// Create state that connects over SSH
    pub fn new(config: ProxyConfig, shutdown: CancellationToken) -> Self {
        Self::with_connector(config, Arc::new(SshConnector::new()), shutdown)
    }

    /// Create state with a custom remote connector
    pub fn with_connector(
        config: ProxyConfig,
        connector: Arc<dyn RemoteConnector>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new(config.max_sessions)),
            config,
            connector,
            shutdown,
        }
    }

    /// Settings handed to each new session
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings::from_config(&self.config)
    }
}
