//! Daemon: main runtime orchestrator.
//!
//! The Daemon ties together all components:
//! - Monitor Engine (registry, price-check and reconciliation loops)
//! - Event Bus (lifecycle notifications)
//! - API Server (operator HTTP endpoints)
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Initialize components
//! 3. Start the engine (rehydrates active positions from the store)
//! 4. Start the API server
//! 5. Main event loop (log lifecycle events)
//! 6. Graceful shutdown on SIGINT

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use keeper_exec::{StubExecutor, StubOracle};
use keeper_store::{MemoryStore, PositionStore};

use crate::api::{create_router, ApiState};
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};
use crate::event_bus::{EngineEvent, EventBus};
use crate::monitor::MonitorEngine;

// =============================================================================
// Daemon
// =============================================================================

/// The main keeper daemon.
pub struct Daemon<S: PositionStore + 'static> {
    /// Configuration
    config: Config,
    /// Monitor engine
    engine: Arc<MonitorEngine<S>>,
    /// Event bus
    event_bus: Arc<EventBus>,
}

impl Daemon<MemoryStore> {
    /// Create a daemon with stub adapters and an in-memory store
    /// (development and testing).
    pub fn new_stub(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let oracle = Arc::new(StubOracle::new());
        let executor = Arc::new(StubExecutor::new());
        let event_bus = Arc::new(EventBus::new(1000));

        let engine = Arc::new(MonitorEngine::new(
            store,
            oracle,
            executor,
            event_bus.clone(),
            config.monitor.clone(),
        ));

        Self { config, engine, event_bus }
    }
}

impl<S: PositionStore + 'static> Daemon<S> {
    /// Create a daemon with provided components.
    pub fn new(config: Config, engine: Arc<MonitorEngine<S>>, event_bus: Arc<EventBus>) -> Self {
        Self { config, engine, event_bus }
    }

    /// The engine backing this daemon.
    pub fn engine(&self) -> &Arc<MonitorEngine<S>> {
        &self.engine
    }

    /// Run the daemon.
    ///
    /// This method blocks until shutdown is requested (SIGINT).
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            "Starting keeper daemon"
        );

        let shutdown = tokio_util::sync::CancellationToken::new();

        // 1. Start the monitor engine (rehydrates from the store)
        MonitorEngine::start(&self.engine).await?;

        // 2. Start the API server
        let api_addr = self.start_api_server().await?;
        info!(%api_addr, "API server started");

        // 3. Subscribe to lifecycle events
        let mut events = self.event_bus.subscribe();

        // 4. Spawn ctrl+c handler
        let ctrl_c_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                error!("Failed to install ctrl+c handler");
            }
            info!("Received ctrl+c, initiating shutdown");
            ctrl_c_shutdown.cancel();
        });

        // 5. Main event loop
        info!("Entering main event loop");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }

                Some(event_result) = events.recv() => {
                    match event_result {
                        Ok(event) => log_event(&event),
                        Err(lag_msg) => warn!(%lag_msg, "Event receiver lagged"),
                    }
                }
            }
        }

        // 6. Graceful shutdown
        self.engine.stop().await;
        info!("Shutdown complete");

        Ok(())
    }

    /// Start the API server.
    async fn start_api_server(&self) -> DaemonResult<SocketAddr> {
        let state = Arc::new(ApiState { engine: Arc::clone(&self.engine) });

        let router = create_router(state);
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| DaemonError::Config(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| DaemonError::Config(format!("Failed to get local address: {}", e)))?;

        // Spawn the server task
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "API server error");
            }
        });

        Ok(local_addr)
    }
}

/// Log a lifecycle event from the bus.
fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::PositionAdded { trade_id, token_symbol, .. } => {
            info!(%trade_id, %token_symbol, "Position added");
        },
        EngineEvent::PositionExited { trade_id, kind, exit_price, profit_loss, .. } => {
            info!(%trade_id, %kind, %exit_price, %profit_loss, "Position exited");
        },
        EngineEvent::PositionExitFailed { trade_id, error, .. } => {
            error!(%trade_id, %error, "Position exit failed");
        },
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_daemon_stub_creation() {
        let config = Config::test();
        let daemon = Daemon::new_stub(config);

        assert!(!daemon.engine().is_running());
        assert_eq!(daemon.engine().monitored_count().await, 0);
    }

    #[tokio::test]
    async fn test_daemon_api_server_start() {
        let config = Config::test();
        let daemon = Daemon::new_stub(config);

        let addr = daemon.start_api_server().await.unwrap();

        // Server should be running on a port
        assert!(addr.port() > 0);

        // Can make a health check request
        let client = reqwest::Client::new();
        let response = client.get(format!("http://{}/health", addr)).send().await.unwrap();

        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn test_daemon_engine_start_stop() {
        let config = Config::test();
        let daemon = Daemon::new_stub(config);

        MonitorEngine::start(daemon.engine()).await.unwrap();
        assert!(daemon.engine().is_running());

        daemon.engine().stop().await;
        assert!(!daemon.engine().is_running());
        assert_eq!(daemon.engine().monitored_count().await, 0);
    }
}
