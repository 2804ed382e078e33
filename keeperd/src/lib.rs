//! Keeper daemon library
//!
//! Runtime orchestrator for the position-exit monitoring core.
//!
//! # Architecture
//!
//! ```text
//! Intake → register_position → Store → Registry
//!                                          ↑
//!            price tick (snapshot, per-position tasks)
//!            sync tick (adopt store-active orphans)
//!                                          ↓
//!          exit condition → Registry.remove → Executor → Store
//!                                          ↓
//!                                      Event Bus
//! ```
//!
//! # Components
//!
//! - **Daemon**: main runtime orchestrator
//! - **Monitor Engine**: price-check and reconciliation loops, exit dispatch
//! - **Position Registry**: concurrency-safe runtime view; its atomic
//!   `remove` is the at-most-once exit gate
//! - **Event Bus**: lifecycle notifications (added, exited, exit-failed)
//! - **API**: HTTP endpoints for intake and operators
//! - **Config**: environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use keeperd::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let daemon = Daemon::new_stub(config);
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod event_bus;
pub mod monitor;
pub mod registry;

// Re-exports for convenience
pub use config::{ApiConfig, Config, Environment, MonitorConfig, StoreConfig};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use event_bus::{EngineEvent, EventBus, EventReceiver};
pub use monitor::{EngineStatus, MonitorEngine, PositionView, RegisterRequest};
pub use registry::PositionRegistry;
