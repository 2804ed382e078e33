//! In-memory store implementation
//!
//! Used for testing and development without a database.
//! Thread-safe using RwLock for concurrent access.

use crate::error::StoreError;
use crate::repository::{HistoryFilter, PositionStore};
use async_trait::async_trait;
use chrono::Utc;
use keeper_domain::{ExitData, MonitoredPosition, PositionId, PositionStatus};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory position store for testing and the stub daemon
pub struct MemoryStore {
    positions: RwLock<HashMap<PositionId, MonitoredPosition>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            positions: RwLock::new(HashMap::new()),
        }
    }

    /// Get the number of stored positions
    pub fn position_count(&self) -> usize {
        self.positions.read().unwrap().len()
    }

    /// Clear all data (useful for test setup)
    pub fn clear(&self) {
        self.positions.write().unwrap().clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PositionStore for MemoryStore {
    async fn insert(&self, position: &MonitoredPosition) -> Result<PositionId, StoreError> {
        let mut positions = self.positions.write().unwrap();

        if positions.contains_key(&position.id) {
            return Err(StoreError::duplicate("position", position.id.to_string()));
        }

        positions.insert(position.id, position.clone());
        Ok(position.id)
    }

    async fn find_by_id(&self, id: PositionId) -> Result<Option<MonitoredPosition>, StoreError> {
        let positions = self.positions.read().unwrap();
        Ok(positions.get(&id).cloned())
    }

    async fn find_by_trade_id(
        &self,
        trade_id: &str,
    ) -> Result<Option<MonitoredPosition>, StoreError> {
        let positions = self.positions.read().unwrap();

        let mut candidates: Vec<&MonitoredPosition> =
            positions.values().filter(|p| p.trade_id == trade_id).collect();

        // Active record wins; otherwise the most recent one
        candidates.sort_by_key(|p| (p.is_active(), p.created_at));
        Ok(candidates.last().map(|p| (*p).clone()))
    }

    async fn list_active(&self) -> Result<Vec<MonitoredPosition>, StoreError> {
        let positions = self.positions.read().unwrap();
        let mut active: Vec<MonitoredPosition> =
            positions.values().filter(|p| p.is_active()).cloned().collect();
        active.sort_by_key(|p| p.created_at);
        Ok(active)
    }

    async fn update_status(
        &self,
        id: PositionId,
        status: PositionStatus,
        exit_data: ExitData,
    ) -> Result<(), StoreError> {
        let mut positions = self.positions.write().unwrap();

        let position = positions
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("position", id.to_string()))?;

        // Repeated terminal writes are last-writer-wins
        position.status = status;
        position.exit_data = Some(exit_data);
        position.updated_at = Utc::now();

        Ok(())
    }

    async fn history(&self, filter: HistoryFilter) -> Result<Vec<MonitoredPosition>, StoreError> {
        let positions = self.positions.read().unwrap();

        let mut records: Vec<MonitoredPosition> = positions
            .values()
            .filter(|p| p.status.is_terminal())
            .filter(|p| match filter.status {
                Some(status) => p.status == status,
                None => true,
            })
            .filter(|p| match &filter.user_id {
                Some(user_id) => &p.user_id == user_id,
                None => true,
            })
            .filter(|p| match &filter.token_symbol {
                Some(symbol) => p.token_symbol.as_str() == symbol.to_uppercase(),
                None => true,
            })
            .cloned()
            .collect();

        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }

        Ok(records)
    }
}

// =============================================================================
// Tests
// =============================================================================
