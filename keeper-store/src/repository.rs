//! Repository trait definition (port)
//!
//! This trait defines the storage interface for monitored positions.
//! Implementations can be PostgreSQL, in-memory, or mock for testing.

use crate::error::StoreError;
use async_trait::async_trait;
use keeper_domain::{ExitData, MonitoredPosition, PositionId, PositionStatus};

/// Filter for terminal-record history queries.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Restrict to one user
    pub user_id: Option<String>,
    /// Restrict to one token symbol
    pub token_symbol: Option<String>,
    /// Restrict to one terminal status (`Exited` or `Failed`)
    pub status: Option<PositionStatus>,
    /// Maximum number of records, newest first
    pub limit: Option<usize>,
}

/// Repository for monitored position records.
///
/// The store is the canonical record; the in-memory registry is the runtime
/// view. Writes must be durable before returning.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Persist a new position. The position's identity must not already
    /// exist; it is stable for the record's lifetime once inserted.
    async fn insert(&self, position: &MonitoredPosition) -> Result<PositionId, StoreError>;

    /// Find a position by durable id.
    async fn find_by_id(&self, id: PositionId) -> Result<Option<MonitoredPosition>, StoreError>;

    /// Find a position by user-facing trade id, preferring the active record
    /// when several share the trade id.
    async fn find_by_trade_id(
        &self,
        trade_id: &str,
    ) -> Result<Option<MonitoredPosition>, StoreError>;

    /// All records with `status == Active`. Callers tolerate overlap across
    /// calls (rehydration is idempotent).
    async fn list_active(&self) -> Result<Vec<MonitoredPosition>, StoreError>;

    /// Write a terminal status and its exit record. Repeated terminal writes
    /// for the same id are last-writer-wins; the caller's registry gate makes
    /// the exiting transition happen at most once per process.
    async fn update_status(
        &self,
        id: PositionId,
        status: PositionStatus,
        exit_data: ExitData,
    ) -> Result<(), StoreError>;

    /// Terminal records matching the filter, newest first.
    async fn history(&self, filter: HistoryFilter) -> Result<Vec<MonitoredPosition>, StoreError>;
}
