//! WebSocket listener
//!
//! Binds the configured address and serves the upgrade route and the
//! health probe until the shutdown token fires.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use crate::server::handler::{health_handler, ws_handler};
use crate::state::ProxyState;

/// Route for the liveness probe
pub const HEALTH_PATH: &str = "/health";

/// HTTP server that upgrades browser connections to terminal sessions
pub struct ProxyServer {
    /// Shared proxy state
    state: Arc<ProxyState>,
}

impl ProxyServer {
    /// Create a new server
    pub fn new(state: Arc<ProxyState>) -> Self {
        Self { state }
    }

    /// Shared proxy state
    pub fn state(&self) -> &Arc<ProxyState> {
        &self.state
    }

    /// Build the router
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.state.config.ws_path, get(ws_handler))
            .route(HEALTH_PATH, get(health_handler))
            .with_state(Arc::clone(&self.state))
    }

    /// Bind and serve until shutdown
    pub async fn run(&self, bind_addr: &str) -> Result<()> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", bind_addr))?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!(
            "WebSocket server listening on {} (path {})",
            local_addr,
            self.state.config.ws_path
        );

        let cancel = self.state.shutdown.clone();
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("WebSocket server failed")?;

        tracing::info!("WebSocket server stopped accepting connections");
        Ok(())
    }

    /// Wait for live sessions to finish tearing down, up to `grace`
    pub async fn drain(&self, grace: Duration) {
        let registry = Arc::clone(&self.state.registry);
        let wait = async {
            while !registry.is_empty() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };

        if tokio::time::timeout(grace, wait).await.is_err() {
            tracing::warn!(
                "{} sessions still open after {:?}, exiting anyway",
                registry.len(),
                grace
            );
        }
    }
}
