//! Keeper storage layer
//!
//! Provides persistence for monitored position records.
//!
//! # Architecture
//!
//! - **Repository trait**: defines the storage interface (port)
//! - **In-memory store**: fast implementation for testing and the stub daemon
//! - **PostgreSQL store**: production implementation (feature `postgres`)
//!
//! The store is the canonical record of every position; the engine's
//! in-memory registry is a runtime view re-established from `list_active`
//! on start and on every reconciliation tick.

#![warn(clippy::all)]

// Modules
mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod repository;

// Re-exports
pub use error::StoreError;
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgPositionStore;
pub use repository::{HistoryFilter, PositionStore};
