//! Keeper daemon
//!
//! Runtime orchestrator for the position-exit monitoring core.
//!
//! # Usage
//!
//! ```bash
//! # Start daemon with default configuration (in-memory store, stub adapters)
//! keeperd
//!
//! # Start with a durable store (requires the `postgres` feature)
//! DATABASE_URL=postgresql://localhost/keeper keeperd
//!
//! # Start with custom environment
//! KEEPER_ENV=test KEEPER_API_PORT=8081 keeperd
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_URL`: PostgreSQL connection string (in-memory store when unset)
//! - `KEEPER_POSITIONS_TABLE`: positions table name (default: positions)
//! - `KEEPER_ENV`: environment (test, development, production)
//! - `KEEPER_API_HOST`: API host (default: 0.0.0.0)
//! - `KEEPER_API_PORT`: API port (default: 8080)
//! - `KEEPER_PRICE_TICK_MS`: price-check period (default: 30000)
//! - `KEEPER_SYNC_TICK_MS`: reconciliation period (default: 60000)
//! - `KEEPER_PRICE_FETCH_TIMEOUT_MS`: per-fetch bound (default: 10000)
//! - `KEEPER_TRAILING_STOP_EPSILON`: trailing band width (default: 0.01)
//! - `KEEPER_TRAILING_STOP_DEFAULT`: initial trailing flag (default: true)
//!
//! The price oracle and swap executor are deployment-provided adapters; this
//! binary wires the stub implementations for development.

use keeperd::{Config, Daemon};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("keeperd=info".parse()?))
        .init();

    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        "Keeper daemon"
    );

    // Create daemon with or without a PostgreSQL-backed store
    #[cfg(feature = "postgres")]
    {
        use keeper_exec::{StubExecutor, StubOracle};
        use keeper_store::PgPositionStore;
        use keeperd::{EventBus, MonitorEngine};
        use std::sync::Arc;

        if let Some(database_url) = config.store.database_url.clone() {
            info!(
                table = %config.store.positions_table,
                "PostgreSQL configured, using durable position store"
            );

            let pool = sqlx::PgPool::connect(&database_url).await?;
            let store = Arc::new(PgPositionStore::new(
                pool,
                config.store.positions_table.clone(),
            ));
            store.ensure_schema().await?;

            let event_bus = Arc::new(EventBus::new(1000));
            let engine = Arc::new(MonitorEngine::new(
                store,
                Arc::new(StubOracle::new()),
                Arc::new(StubExecutor::new()),
                event_bus.clone(),
                config.monitor.clone(),
            ));

            let daemon = Daemon::new(config, engine, event_bus);
            daemon.run().await?;
            return Ok(());
        }

        info!("No DATABASE_URL configured, using in-memory store");
    }

    let daemon = Daemon::new_stub(config);
    daemon.run().await?;

    Ok(())
}
