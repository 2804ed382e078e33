//! Position registry: the authoritative runtime view of open positions.
//!
//! A concurrency-safe map keyed by durable position id. The atomic `remove`
//! is the single linearization point for the `active → exiting` transition:
//! whichever caller takes the position out drives the exit, every other
//! caller observes "not present" and aborts with no side effect.

use keeper_domain::{MonitoredPosition, PositionId};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Concurrency-safe registry of monitored positions.
pub struct PositionRegistry {
    inner: RwLock<HashMap<PositionId, MonitoredPosition>>,
}

impl PositionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Add a position. Idempotent: an existing entry is never overwritten.
    ///
    /// Returns `true` when the position was inserted, `false` when an entry
    /// with the same id was already present.
    pub async fn insert(&self, position: MonitoredPosition) -> bool {
        let mut inner = self.inner.write().await;
        match inner.entry(position.id) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(position);
                true
            },
        }
    }

    /// Atomically take a position out of the registry.
    ///
    /// This is the exclusion primitive that guarantees single-exit: exactly
    /// one caller receives the position, all others get `None`.
    pub async fn remove(&self, id: PositionId) -> Option<MonitoredPosition> {
        let mut inner = self.inner.write().await;
        inner.remove(&id)
    }

    /// Clone of one entry.
    pub async fn get(&self, id: PositionId) -> Option<MonitoredPosition> {
        let inner = self.inner.read().await;
        inner.get(&id).cloned()
    }

    /// Whether an entry exists for this id.
    pub async fn contains(&self, id: PositionId) -> bool {
        let inner = self.inner.read().await;
        inner.contains_key(&id)
    }

    /// Copy of the current values, for iteration without holding the lock.
    pub async fn snapshot(&self) -> Vec<MonitoredPosition> {
        let inner = self.inner.read().await;
        inner.values().cloned().collect()
    }

    /// Linear scan by user-facing trade id. Used only for operator-initiated
    /// manual exit and status lookups.
    pub async fn find_by_trade_id(&self, trade_id: &str) -> Option<MonitoredPosition> {
        let inner = self.inner.read().await;
        inner.values().find(|p| p.trade_id == trade_id).cloned()
    }

    /// Mutate one entry in place and return the updated clone.
    ///
    /// Returns `None` when the position is no longer present (e.g. an exit
    /// removed it between snapshot and update).
    pub async fn update<F>(&self, id: PositionId, mutate: F) -> Option<MonitoredPosition>
    where
        F: FnOnce(&mut MonitoredPosition),
    {
        let mut inner = self.inner.write().await;
        let position = inner.get_mut(&id)?;
        mutate(position);
        Some(position.clone())
    }

    /// Number of monitored positions.
    pub async fn len(&self) -> usize {
        let inner = self.inner.read().await;
        inner.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove every entry.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.clear();
    }
}

impl Default for PositionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
