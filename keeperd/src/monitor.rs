//! Monitor engine: periodic evaluation of open positions and exit dispatch.
//!
//! The engine owns two recurring tasks:
//! - **Price-check tick**: snapshots the registry and evaluates every
//!   position against a live price, independently and in parallel
//! - **Reconciliation tick**: scans the durable store for active records
//!   missing from the registry and adopts them
//!
//! # Exit state machine
//!
//! ```text
//! active → registry.remove() → exiting → executor → exited (store + event)
//!                                           ↓
//!                                        failure → failed (store + event)
//! ```
//!
//! The registry `remove` is atomic and happens exactly once per position, so
//! only one caller enters `exiting`; everything downstream (executor call,
//! terminal store write) runs outside the registry lock. A failed position is
//! never returned to monitoring.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use keeper_domain::{
    evaluate_exit, update_trailing_stop_banded, Amount, ExitData, ExitKind, MonitoredPosition,
    NewPosition, PositionId, PositionStatus, Price, Side, TokenSymbol,
};
use keeper_exec::{PriceOracle, SwapExecutor, SwapRequest};
use keeper_store::{HistoryFilter, PositionStore};

use crate::config::MonitorConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::event_bus::{EngineEvent, EventBus};
use crate::registry::PositionRegistry;

// =============================================================================
// Requests & read models
// =============================================================================

/// Registration request from the intake collaborator, submitted after the
/// entry trade succeeded.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    /// User-facing trade identity, unique per open position
    pub trade_id: String,
    /// Owning user
    pub user_id: String,
    /// Wallet the exit swap executes from
    pub safe_address: String,
    /// Network the exit swap executes on
    pub network_key: String,
    /// Key into the price oracle
    pub token_symbol: String,
    /// "buy" or "sell"
    pub side: String,
    /// Entry fill price
    pub entry_price: Decimal,
    /// Entry size
    pub entry_amount: Decimal,
    /// First take-profit threshold
    pub tp1: Decimal,
    /// Second take-profit threshold
    pub tp2: Decimal,
    /// Static stop-loss threshold
    pub sl: Decimal,
    /// Hard wall-clock deadline
    pub max_exit_time: chrono::DateTime<Utc>,
    /// Transaction hash of the entry trade
    #[serde(default)]
    pub entry_tx_hash: Option<String>,
    /// Per-position trailing override; the configured default applies when
    /// absent
    #[serde(default)]
    pub trailing_stop_enabled: Option<bool>,
}

impl RegisterRequest {
    fn to_new_position(&self) -> DaemonResult<NewPosition> {
        if self.trade_id.trim().is_empty() {
            return Err(DaemonError::InvalidRequest("trade_id must be non-empty".to_string()));
        }

        let side = Side::parse(&self.side).ok_or_else(|| {
            DaemonError::InvalidRequest(format!(
                "Invalid side: {}. Expected: buy or sell",
                self.side
            ))
        })?;

        Ok(NewPosition {
            trade_id: self.trade_id.trim().to_string(),
            user_id: self.user_id.clone(),
            safe_address: self.safe_address.clone(),
            network_key: self.network_key.clone(),
            token_symbol: TokenSymbol::new(&self.token_symbol)?,
            side,
            entry_price: Price::new(self.entry_price)?,
            entry_amount: Amount::new(self.entry_amount)?,
            tp1: Price::new(self.tp1)?,
            tp2: Price::new(self.tp2)?,
            sl: Price::new(self.sl)?,
            max_exit_time: self.max_exit_time,
            entry_tx_hash: self.entry_tx_hash.clone(),
        })
    }
}

/// Engine status snapshot for the operator surface.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Whether the monitoring loops are live
    pub is_running: bool,
    /// Number of positions in the registry
    pub monitored_count: usize,
    /// Configured price-check period
    pub price_tick_ms: u64,
    /// Configured reconciliation period
    pub sync_tick_ms: u64,
    /// Per-position monitoring view
    pub positions: Vec<PositionView>,
}

/// Per-position entry in the status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct PositionView {
    /// User-facing trade id
    pub trade_id: String,
    /// Token under monitoring
    pub token_symbol: String,
    /// Price observed on the most recent check
    pub current_price: Option<Decimal>,
    /// Entry fill price
    pub entry_price: Decimal,
    /// First take-profit threshold
    pub tp1: Decimal,
    /// Second take-profit threshold
    pub tp2: Decimal,
    /// Static stop-loss threshold
    pub sl: Decimal,
    /// Current adaptive stop
    pub trailing_stop_price: Decimal,
    /// Most favorable price since entry
    pub highest_favorable_price: Decimal,
    /// Seconds until the hard deadline, clamped at zero
    pub time_remaining_secs: i64,
    /// Number of completed price checks
    pub price_check_count: u64,
}

impl PositionView {
    fn from_position(position: &MonitoredPosition) -> Self {
        Self {
            trade_id: position.trade_id.clone(),
            token_symbol: position.token_symbol.as_str().to_string(),
            current_price: position.current_price.map(|p| p.as_decimal()),
            entry_price: position.entry_price.as_decimal(),
            tp1: position.tp1.as_decimal(),
            tp2: position.tp2.as_decimal(),
            sl: position.sl.as_decimal(),
            trailing_stop_price: position.trailing_stop_price.as_decimal(),
            highest_favorable_price: position.highest_favorable_price.as_decimal(),
            time_remaining_secs: position.time_remaining(Utc::now()).num_seconds(),
            price_check_count: position.price_check_count,
        }
    }
}

// =============================================================================
// Monitor engine
// =============================================================================

/// Drives the exit lifecycle of every open position.
pub struct MonitorEngine<S: PositionStore + 'static> {
    /// Durable store (canonical records)
    store: Arc<S>,
    /// Price oracle adapter
    oracle: Arc<dyn PriceOracle>,
    /// Swap executor adapter
    executor: Arc<dyn SwapExecutor>,
    /// Runtime view of open positions
    registry: Arc<PositionRegistry>,
    /// Lifecycle event fan-out
    event_bus: Arc<EventBus>,
    /// Configuration
    config: MonitorConfig,
    /// Cancellation token for the current run, replaced on each start
    shutdown_token: StdMutex<CancellationToken>,
    /// Whether the loops are live
    running: AtomicBool,
    /// Handles of the two recurring loops
    loop_handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl<S: PositionStore + 'static> MonitorEngine<S> {
    /// Create a new engine. Call `start` on an `Arc` of it to begin
    /// monitoring.
    pub fn new(
        store: Arc<S>,
        oracle: Arc<dyn PriceOracle>,
        executor: Arc<dyn SwapExecutor>,
        event_bus: Arc<EventBus>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            oracle,
            executor,
            registry: Arc::new(PositionRegistry::new()),
            event_bus,
            config,
            shutdown_token: StdMutex::new(CancellationToken::new()),
            running: AtomicBool::new(false),
            loop_handles: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Whether the monitoring loops are live.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of positions currently monitored.
    pub async fn monitored_count(&self) -> usize {
        self.registry.len().await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start monitoring: rehydrate the active set from the store, then spawn
    /// the price-check and reconciliation loops. The first price check runs
    /// immediately.
    ///
    /// Takes the engine behind its `Arc` so the loops can hold it:
    /// `MonitorEngine::start(&engine).await`.
    pub async fn start(engine: &Arc<Self>) -> DaemonResult<()> {
        if engine.running.swap(true, Ordering::SeqCst) {
            debug!("Monitor engine already running");
            return Ok(());
        }

        let rehydrated = match engine.rehydrate().await {
            Ok(count) => count,
            Err(e) => {
                engine.running.store(false, Ordering::SeqCst);
                return Err(e);
            },
        };

        info!(
            rehydrated,
            price_tick_ms = engine.config.price_tick_ms,
            sync_tick_ms = engine.config.sync_tick_ms,
            "Monitor engine started"
        );

        let token = CancellationToken::new();
        {
            let mut guard = engine.shutdown_token.lock().unwrap();
            *guard = token.clone();
        }

        let price_loop = {
            let engine = Arc::clone(engine);
            let token = token.clone();
            tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval(Duration::from_millis(engine.config.price_tick_ms));
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = interval.tick() => Self::run_price_tick(&engine).await,
                    }
                }
                debug!("Price-check loop terminated");
            })
        };

        let sync_loop = {
            let engine = Arc::clone(engine);
            let token = token.clone();
            tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval(Duration::from_millis(engine.config.sync_tick_ms));
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = interval.tick() => engine.run_sync_tick().await,
                    }
                }
                debug!("Reconciliation loop terminated");
            })
        };

        let mut handles = engine.loop_handles.lock().await;
        handles.push(price_loop);
        handles.push(sync_loop);

        Ok(())
    }

    /// Stop monitoring: cancel both loops, wait up to the grace period for
    /// in-flight work, then clear the registry.
    ///
    /// Work that already passed the registry `remove` gate is allowed to
    /// finish so the store reflects reality; work that has not is abandoned.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("Stopping monitor engine");
        self.shutdown_token.lock().unwrap().cancel();

        let grace = Duration::from_millis(self.config.shutdown_grace_ms);
        let mut handles = self.loop_handles.lock().await;
        for mut handle in handles.drain(..) {
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                warn!("Monitor loop did not stop within grace period, aborting");
                handle.abort();
            }
        }

        self.registry.clear().await;
        info!("Monitor engine stopped");
    }

    /// Load every active record from the store into the registry.
    async fn rehydrate(&self) -> DaemonResult<usize> {
        let active = self.store.list_active().await?;
        let mut count = 0;

        for mut position in active {
            position.reseed_trailing(self.config.trailing_stop_epsilon);
            if self.registry.insert(position).await {
                count += 1;
            }
        }

        Ok(count)
    }

    // =========================================================================
    // Registration & manual exit
    // =========================================================================

    /// Register a position for monitoring.
    ///
    /// Persists to the store first, then publishes into the registry; a store
    /// failure leaves the registry untouched. Rejects a trade id that is
    /// already open.
    pub async fn register_position(&self, request: RegisterRequest) -> DaemonResult<PositionId> {
        let entry = request.to_new_position()?;

        if self.registry.find_by_trade_id(&entry.trade_id).await.is_some() {
            return Err(DaemonError::DuplicateTradeId(entry.trade_id));
        }
        if let Some(existing) = self.store.find_by_trade_id(&entry.trade_id).await? {
            if existing.is_active() {
                return Err(DaemonError::DuplicateTradeId(entry.trade_id));
            }
        }

        let trailing_enabled = request
            .trailing_stop_enabled
            .unwrap_or(self.config.trailing_stop_default);
        let position =
            MonitoredPosition::open(entry, trailing_enabled, self.config.trailing_stop_epsilon);

        let id = self.store.insert(&position).await?;

        info!(
            position_id = %id,
            trade_id = %position.trade_id,
            token = %position.token_symbol,
            side = %position.side,
            entry_price = %position.entry_price,
            "Position registered for monitoring"
        );

        let trade_id = position.trade_id.clone();
        let token_symbol = position.token_symbol.as_str().to_string();
        self.registry.insert(position).await;

        self.event_bus.send(EngineEvent::PositionAdded {
            position_id: id,
            trade_id,
            token_symbol,
            timestamp: Utc::now(),
        });

        Ok(id)
    }

    /// Operator-initiated exit by trade id.
    ///
    /// Synthesizes a `manual` exit condition at the last known price (or the
    /// entry price before any check has completed). Returns `true` when this
    /// call drove the position out of monitoring.
    pub async fn manual_exit(&self, trade_id: &str, reason: &str) -> DaemonResult<bool> {
        let Some(position) = self.registry.find_by_trade_id(trade_id).await else {
            debug!(trade_id, "Manual exit requested for unknown or closed position");
            return Ok(false);
        };

        info!(trade_id, reason, "Manual exit requested");
        self.trigger_exit(
            position.id,
            position.last_known_price(),
            ExitKind::Manual,
            Some(reason.to_string()),
        )
        .await
    }

    /// Emergency: exit every monitored position with a `manual` kind.
    ///
    /// Returns the trade ids this call drove out of monitoring.
    pub async fn exit_all(&self, reason: &str) -> DaemonResult<Vec<String>> {
        warn!(reason, "Exiting all monitored positions");

        let snapshot = self.registry.snapshot().await;
        let mut exited = Vec::new();

        for position in snapshot {
            match self
                .trigger_exit(
                    position.id,
                    position.last_known_price(),
                    ExitKind::Manual,
                    Some(reason.to_string()),
                )
                .await
            {
                Ok(true) => exited.push(position.trade_id),
                Ok(false) => {},
                Err(e) => {
                    error!(trade_id = %position.trade_id, error = %e, "Exit-all failed for position")
                },
            }
        }

        info!(count = exited.len(), "Exit-all complete");
        Ok(exited)
    }

    // =========================================================================
    // Read surface
    // =========================================================================

    /// Status snapshot for the operator surface.
    pub async fn status(&self) -> EngineStatus {
        let snapshot = self.registry.snapshot().await;
        let positions = snapshot.iter().map(PositionView::from_position).collect();

        EngineStatus {
            is_running: self.is_running(),
            monitored_count: snapshot.len(),
            price_tick_ms: self.config.price_tick_ms,
            sync_tick_ms: self.config.sync_tick_ms,
            positions,
        }
    }

    /// All active records from the durable store.
    pub async fn get_active(&self) -> DaemonResult<Vec<MonitoredPosition>> {
        Ok(self.store.list_active().await?)
    }

    /// Terminal records matching the filter.
    pub async fn get_history(
        &self,
        filter: HistoryFilter,
    ) -> DaemonResult<Vec<MonitoredPosition>> {
        Ok(self.store.history(filter).await?)
    }

    /// One position by trade id: the live registry entry when monitored,
    /// otherwise the stored record.
    pub async fn get_position_status(
        &self,
        trade_id: &str,
    ) -> DaemonResult<Option<MonitoredPosition>> {
        if let Some(position) = self.registry.find_by_trade_id(trade_id).await {
            return Ok(Some(position));
        }
        Ok(self.store.find_by_trade_id(trade_id).await?)
    }

    // =========================================================================
    // Price-check tick
    // =========================================================================

    /// One price-check tick: snapshot the registry and evaluate every
    /// position as an independent task. A failure in one position never
    /// affects another.
    async fn run_price_tick(engine: &Arc<Self>) {
        let snapshot = engine.registry.snapshot().await;
        if snapshot.is_empty() {
            return;
        }

        let mut tasks = JoinSet::new();
        for position in snapshot {
            let engine = Arc::clone(engine);
            let id = position.id;
            let trade_id = position.trade_id.clone();
            tasks.spawn(async move {
                if let Err(e) = engine.check_position(id).await {
                    warn!(position_id = %id, trade_id = %trade_id, error = %e, "Position check failed");
                }
            });
        }

        while tasks.join_next().await.is_some() {}
    }

    /// One monitoring step for one position: fetch a price, advance the
    /// trailing tracker, evaluate the exit conditions, and drive the exit
    /// state machine on trigger.
    async fn check_position(&self, id: PositionId) -> DaemonResult<()> {
        let Some(position) = self.registry.get(id).await else {
            return Ok(()); // Removed since the snapshot was taken
        };

        // 1. Fetch the price, bounded by the configured timeout. A failure
        //    skips this tick for this position with no state change.
        let fetch = tokio::time::timeout(
            Duration::from_millis(self.config.price_fetch_timeout_ms),
            self.oracle.get_price(&position.token_symbol),
        )
        .await;

        let price = match fetch {
            Ok(Ok(price)) => price,
            Ok(Err(e)) => {
                debug!(trade_id = %position.trade_id, error = %e, "Price fetch failed, skipping tick");
                return Ok(());
            },
            Err(_) => {
                debug!(trade_id = %position.trade_id, "Price fetch timed out, skipping tick");
                return Ok(());
            },
        };

        let now = Utc::now();
        let epsilon = self.config.trailing_stop_epsilon;

        // 2. + 3. Record the check and advance the trailing extremum.
        let updated = self
            .registry
            .update(id, |p| {
                p.record_price_check(price, now);
                if let Some(update) =
                    update_trailing_stop_banded(p.side, price, p.highest_favorable_price, epsilon)
                {
                    p.highest_favorable_price = update.new_favorable_extreme;
                    p.trailing_stop_price = update.new_stop;
                }
            })
            .await;

        let Some(updated) = updated else {
            return Ok(()); // An exit won the race
        };

        // 4. Evaluate the exit conditions in priority order.
        if let Some(kind) = evaluate_exit(&updated, price, now) {
            self.trigger_exit(id, price, kind, None).await?;
        }

        Ok(())
    }

    // =========================================================================
    // Exit state machine
    // =========================================================================

    /// Drive the exit state machine for one position.
    ///
    /// Returns `true` when this caller performed the `active → exiting`
    /// transition (regardless of whether the exit then completed or failed),
    /// `false` when another caller already holds it.
    async fn trigger_exit(
        &self,
        id: PositionId,
        exit_price: Price,
        kind: ExitKind,
        reason: Option<String>,
    ) -> DaemonResult<bool> {
        // The atomic take-out is the single linearization point: every other
        // concurrent caller observes "not present" and aborts here.
        let Some(position) = self.registry.remove(id).await else {
            debug!(position_id = %id, "Exit already in progress, skipping");
            return Ok(false);
        };

        info!(
            trade_id = %position.trade_id,
            kind = %kind,
            exit_price = %exit_price,
            "Exit condition met, dispatching reversing trade"
        );

        let request = SwapRequest::reversing(&position);

        match self.executor.execute(&request).await {
            Ok(receipt) => {
                let profit_loss = position.profit_loss(exit_price);
                let exited_at = Utc::now();

                let exit_data = ExitData::Completed {
                    kind,
                    exit_price,
                    exit_amount: position.entry_amount,
                    profit_loss,
                    exited_at,
                };

                if let Err(e) = self
                    .store
                    .update_status(position.id, PositionStatus::Exited, exit_data)
                    .await
                {
                    // The swap already settled on-venue. Accept the divergence
                    // and leave correction to reconciliation or the operator.
                    error!(
                        trade_id = %position.trade_id,
                        error = %e,
                        "Terminal store update failed after successful exit"
                    );
                }

                info!(
                    trade_id = %position.trade_id,
                    kind = %kind,
                    exit_price = %exit_price,
                    profit_loss = %profit_loss,
                    tx_hash = %receipt.tx_hash,
                    "Position exited"
                );

                self.event_bus.send(EngineEvent::PositionExited {
                    position_id: position.id,
                    trade_id: position.trade_id.clone(),
                    kind,
                    exit_price,
                    profit_loss,
                    tx_hash: receipt.tx_hash,
                    reason,
                    timestamp: exited_at,
                });

                Ok(true)
            },
            Err(e) => {
                let failed_at = Utc::now();
                error!(
                    trade_id = %position.trade_id,
                    kind = %kind,
                    error = %e,
                    "Reversing trade failed, position requires operator intervention"
                );

                let exit_data = ExitData::Failed {
                    error: e.to_string(),
                    failed_at,
                };

                if let Err(store_err) = self
                    .store
                    .update_status(position.id, PositionStatus::Failed, exit_data)
                    .await
                {
                    error!(
                        trade_id = %position.trade_id,
                        error = %store_err,
                        "Failed to record failed exit in store"
                    );
                }

                self.event_bus.send(EngineEvent::PositionExitFailed {
                    position_id: position.id,
                    trade_id: position.trade_id.clone(),
                    error: e.to_string(),
                    timestamp: failed_at,
                });

                Ok(true)
            },
        }
    }

    // =========================================================================
    // Reconciliation tick
    // =========================================================================

    /// One reconciliation tick: adopt every store-active record missing from
    /// the registry (crash recovery, peer instance, direct insert).
    async fn run_sync_tick(&self) {
        let active = match self.store.list_active().await {
            Ok(active) => active,
            Err(e) => {
                warn!(error = %e, "Reconciliation scan failed");
                return;
            },
        };

        for mut position in active {
            if self.registry.contains(position.id).await {
                continue;
            }

            position.reseed_trailing(self.config.trailing_stop_epsilon);
            let id = position.id;
            let trade_id = position.trade_id.clone();
            let token = position.token_symbol.as_str().to_string();

            if self.registry.insert(position).await {
                info!(position_id = %id, trade_id = %trade_id, "Adopted position from store");
                self.event_bus.send(EngineEvent::PositionAdded {
                    position_id: id,
                    trade_id,
                    token_symbol: token,
                    timestamp: Utc::now(),
                });
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use keeper_exec::{StubExecutor, StubOracle};
    use keeper_store::{MemoryStore, StoreError};
    use rust_decimal_macros::dec;

    struct TestHarness {
        engine: Arc<MonitorEngine<MemoryStore>>,
        store: Arc<MemoryStore>,
        oracle: Arc<StubOracle>,
        executor: Arc<StubExecutor>,
        event_bus: Arc<EventBus>,
    }

    fn harness() -> TestHarness {
        let store = Arc::new(MemoryStore::new());
        let oracle = Arc::new(StubOracle::new());
        let executor = Arc::new(StubExecutor::new());
        let event_bus = Arc::new(EventBus::new(100));

        let engine = Arc::new(MonitorEngine::new(
            store.clone(),
            oracle.clone(),
            executor.clone(),
            event_bus.clone(),
            crate::config::Config::test().monitor,
        ));

        TestHarness { engine, store, oracle, executor, event_bus }
    }

    fn buy_request(trade_id: &str) -> RegisterRequest {
        RegisterRequest {
            trade_id: trade_id.to_string(),
            user_id: "u-1".to_string(),
            safe_address: "0xsafe".to_string(),
            network_key: "base".to_string(),
            token_symbol: "ETH".to_string(),
            side: "buy".to_string(),
            entry_price: dec!(2400),
            entry_amount: dec!(0.1),
            tp1: dec!(2500),
            tp2: dec!(2600),
            sl: dec!(2350),
            max_exit_time: Utc::now() + ChronoDuration::hours(1),
            entry_tx_hash: None,
            trailing_stop_enabled: None,
        }
    }

    fn eth() -> TokenSymbol {
        TokenSymbol::new("ETH").unwrap()
    }

    #[tokio::test]
    async fn test_register_persists_then_publishes() {
        let h = harness();

        let id = h.engine.register_position(buy_request("t-1")).await.unwrap();

        let stored = h.store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.trade_id, "t-1");
        assert!(stored.is_active());
        assert_eq!(h.engine.monitored_count().await, 1);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_open_trade_id() {
        let h = harness();

        h.engine.register_position(buy_request("t-1")).await.unwrap();
        let result = h.engine.register_position(buy_request("t-1")).await;

        assert!(matches!(result, Err(DaemonError::DuplicateTradeId(_))));
        assert_eq!(h.engine.monitored_count().await, 1);
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_thresholds() {
        let h = harness();

        let mut request = buy_request("t-1");
        request.entry_amount = dec!(-0.1);

        let result = h.engine.register_position(request).await;
        assert!(matches!(result, Err(DaemonError::Domain(_))));
        assert_eq!(h.engine.monitored_count().await, 0);
    }

    #[tokio::test]
    async fn test_register_store_failure_leaves_registry_untouched() {
        struct RejectingStore;

        #[async_trait]
        impl PositionStore for RejectingStore {
            async fn insert(&self, _: &MonitoredPosition) -> Result<PositionId, StoreError> {
                Err(StoreError::Database("connection refused".to_string()))
            }
            async fn find_by_id(
                &self,
                _: PositionId,
            ) -> Result<Option<MonitoredPosition>, StoreError> {
                Ok(None)
            }
            async fn find_by_trade_id(
                &self,
                _: &str,
            ) -> Result<Option<MonitoredPosition>, StoreError> {
                Ok(None)
            }
            async fn list_active(&self) -> Result<Vec<MonitoredPosition>, StoreError> {
                Ok(Vec::new())
            }
            async fn update_status(
                &self,
                _: PositionId,
                _: PositionStatus,
                _: ExitData,
            ) -> Result<(), StoreError> {
                Ok(())
            }
            async fn history(
                &self,
                _: HistoryFilter,
            ) -> Result<Vec<MonitoredPosition>, StoreError> {
                Ok(Vec::new())
            }
        }

        let engine = Arc::new(MonitorEngine::new(
            Arc::new(RejectingStore),
            Arc::new(StubOracle::new()),
            Arc::new(StubExecutor::new()),
            Arc::new(EventBus::new(10)),
            crate::config::Config::test().monitor,
        ));

        let result = engine.register_position(buy_request("t-1")).await;

        assert!(matches!(result, Err(DaemonError::Store(_))));
        assert_eq!(engine.monitored_count().await, 0);
    }

    #[tokio::test]
    async fn test_price_tick_triggers_tp1() {
        let h = harness();
        let id = h.engine.register_position(buy_request("t-1")).await.unwrap();

        h.oracle.set_price(&eth(), dec!(2505));
        MonitorEngine::run_price_tick(&h.engine).await;

        let stored = h.store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.status, PositionStatus::Exited);
        match stored.exit_data.unwrap() {
            ExitData::Completed { kind, exit_price, profit_loss, .. } => {
                assert_eq!(kind, ExitKind::Tp1);
                assert_eq!(exit_price.as_decimal(), dec!(2505));
                assert_eq!(profit_loss, dec!(10.5));
            },
            other => panic!("Expected completed exit, got {:?}", other),
        }
        assert_eq!(h.executor.execution_count(), 1);
        assert_eq!(h.engine.monitored_count().await, 0);
    }

    #[tokio::test]
    async fn test_oracle_failure_skips_tick_without_state_change() {
        let h = harness();
        h.engine.register_position(buy_request("t-1")).await.unwrap();

        // No price configured: every fetch fails
        MonitorEngine::run_price_tick(&h.engine).await;

        let position = h.engine.get_position_status("t-1").await.unwrap().unwrap();
        assert_eq!(position.price_check_count, 0);
        assert!(position.current_price.is_none());
        assert!(position.is_active());
        assert_eq!(h.executor.execution_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_in_one_position_does_not_affect_another() {
        let h = harness();
        h.engine.register_position(buy_request("t-1")).await.unwrap();

        let mut other = buy_request("t-2");
        other.token_symbol = "SOL".to_string();
        other.entry_price = dec!(100);
        other.tp1 = dec!(110);
        other.tp2 = dec!(120);
        other.sl = dec!(90);
        h.engine.register_position(other).await.unwrap();

        // Only SOL has a quote; the ETH fetch fails
        h.oracle.set_price(&TokenSymbol::new("SOL").unwrap(), dec!(105));
        MonitorEngine::run_price_tick(&h.engine).await;

        let eth_pos = h.engine.get_position_status("t-1").await.unwrap().unwrap();
        let sol_pos = h.engine.get_position_status("t-2").await.unwrap().unwrap();
        assert_eq!(eth_pos.price_check_count, 0);
        assert_eq!(sol_pos.price_check_count, 1);
    }

    #[tokio::test]
    async fn test_trailing_tracker_advances_on_new_high() {
        let h = harness();
        h.engine.register_position(buy_request("t-1")).await.unwrap();

        h.oracle.set_price(&eth(), dec!(2480));
        MonitorEngine::run_price_tick(&h.engine).await;

        let position = h.engine.get_position_status("t-1").await.unwrap().unwrap();
        assert_eq!(position.highest_favorable_price.as_decimal(), dec!(2480));
        assert_eq!(position.trailing_stop_price.as_decimal(), dec!(2455.20));
    }

    #[tokio::test]
    async fn test_concurrent_exits_execute_at_most_once() {
        let h = harness();
        let id = h.engine.register_position(buy_request("t-1")).await.unwrap();
        h.oracle.set_price(&eth(), dec!(2505));

        let e1 = Arc::clone(&h.engine);
        let e2 = Arc::clone(&h.engine);
        let e3 = Arc::clone(&h.engine);
        let price = Price::new(dec!(2505)).unwrap();

        let (a, b, c) = tokio::join!(
            tokio::spawn(async move { e1.trigger_exit(id, price, ExitKind::Tp1, None).await }),
            tokio::spawn(async move { e2.trigger_exit(id, price, ExitKind::Tp1, None).await }),
            tokio::spawn(
                async move { e3.manual_exit("t-1", "operator race").await }
            ),
        );

        let performed = [a.unwrap().unwrap(), b.unwrap().unwrap(), c.unwrap().unwrap()]
            .into_iter()
            .filter(|performed| *performed)
            .count();

        assert_eq!(performed, 1);
        assert_eq!(h.executor.execution_count(), 1);
    }

    #[tokio::test]
    async fn test_executor_failure_marks_failed_and_never_returns() {
        let h = harness();
        let id = h.engine.register_position(buy_request("t-1")).await.unwrap();
        let mut events = h.event_bus.subscribe();

        h.oracle.set_price(&eth(), dec!(2505));
        h.executor.set_fail_next(true);
        MonitorEngine::run_price_tick(&h.engine).await;

        let stored = h.store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.status, PositionStatus::Failed);
        assert!(matches!(stored.exit_data, Some(ExitData::Failed { .. })));
        assert_eq!(h.engine.monitored_count().await, 0);

        // Further ticks must not resurrect or retry the position
        MonitorEngine::run_price_tick(&h.engine).await;
        assert_eq!(h.engine.monitored_count().await, 0);
        assert_eq!(h.executor.execution_count(), 0);

        // Skip the registration event, then expect the failure event
        let mut saw_failure = false;
        while let Some(Ok(event)) = events.try_recv() {
            if let EngineEvent::PositionExitFailed { trade_id, .. } = event {
                assert_eq!(trade_id, "t-1");
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn test_manual_exit_records_manual_kind_at_last_known_price() {
        let h = harness();
        let id = h.engine.register_position(buy_request("t-1")).await.unwrap();

        h.oracle.set_price(&eth(), dec!(2450));
        MonitorEngine::run_price_tick(&h.engine).await;

        let executed = h.engine.manual_exit("t-1", "signal expired").await.unwrap();
        assert!(executed);

        let stored = h.store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.status, PositionStatus::Exited);
        match stored.exit_data.unwrap() {
            ExitData::Completed { kind, exit_price, .. } => {
                assert_eq!(kind, ExitKind::Manual);
                assert_eq!(exit_price.as_decimal(), dec!(2450));
            },
            other => panic!("Expected completed exit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_manual_exit_before_any_check_uses_entry_price() {
        let h = harness();
        let id = h.engine.register_position(buy_request("t-1")).await.unwrap();

        let executed = h.engine.manual_exit("t-1", "abort").await.unwrap();
        assert!(executed);

        let stored = h.store.find_by_id(id).await.unwrap().unwrap();
        match stored.exit_data.unwrap() {
            ExitData::Completed { exit_price, profit_loss, .. } => {
                assert_eq!(exit_price.as_decimal(), dec!(2400));
                assert_eq!(profit_loss, Decimal::ZERO);
            },
            other => panic!("Expected completed exit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_manual_exit_unknown_trade_id_is_false() {
        let h = harness();
        let executed = h.engine.manual_exit("missing", "whatever").await.unwrap();
        assert!(!executed);
    }

    #[tokio::test]
    async fn test_sync_tick_adopts_direct_store_insert() {
        let h = harness();
        let mut events = h.event_bus.subscribe();

        // Insert into the store directly, bypassing register_position
        let entry = NewPosition {
            trade_id: "orphan-1".to_string(),
            user_id: "u-9".to_string(),
            safe_address: "0xsafe".to_string(),
            network_key: "base".to_string(),
            token_symbol: eth(),
            side: Side::Buy,
            entry_price: Price::new(dec!(2400)).unwrap(),
            entry_amount: Amount::new(dec!(0.1)).unwrap(),
            tp1: Price::new(dec!(2500)).unwrap(),
            tp2: Price::new(dec!(2600)).unwrap(),
            sl: Price::new(dec!(2350)).unwrap(),
            max_exit_time: Utc::now() + ChronoDuration::hours(1),
            entry_tx_hash: None,
        };
        let orphan = MonitoredPosition::open(entry, true, dec!(0.01));
        h.store.insert(&orphan).await.unwrap();

        assert_eq!(h.engine.monitored_count().await, 0);
        h.engine.run_sync_tick().await;
        assert_eq!(h.engine.monitored_count().await, 1);

        match events.try_recv().unwrap().unwrap() {
            EngineEvent::PositionAdded { trade_id, .. } => assert_eq!(trade_id, "orphan-1"),
            other => panic!("Expected PositionAdded, got {:?}", other),
        }

        // Re-running the tick does not duplicate the entry
        h.engine.run_sync_tick().await;
        assert_eq!(h.engine.monitored_count().await, 1);
    }

    #[tokio::test]
    async fn test_start_rehydrates_and_stop_clears() {
        let h = harness();
        h.engine.register_position(buy_request("t-1")).await.unwrap();

        h.engine.stop().await; // no-op, not started
        MonitorEngine::start(&h.engine).await.unwrap();
        assert!(h.engine.is_running());
        assert_eq!(h.engine.monitored_count().await, 1);

        h.engine.stop().await;
        assert!(!h.engine.is_running());
        assert_eq!(h.engine.monitored_count().await, 0);

        // Restarting rehydrates the same registry contents from the store
        MonitorEngine::start(&h.engine).await.unwrap();
        assert_eq!(h.engine.monitored_count().await, 1);
        h.engine.stop().await;
    }

    #[tokio::test]
    async fn test_status_reports_monitoring_fields() {
        let h = harness();
        h.engine.register_position(buy_request("t-1")).await.unwrap();
        h.oracle.set_price(&eth(), dec!(2450));
        MonitorEngine::run_price_tick(&h.engine).await;

        let status = h.engine.status().await;
        assert_eq!(status.monitored_count, 1);
        assert_eq!(status.positions.len(), 1);

        let view = &status.positions[0];
        assert_eq!(view.trade_id, "t-1");
        assert_eq!(view.token_symbol, "ETH");
        assert_eq!(view.current_price, Some(dec!(2450)));
        assert_eq!(view.price_check_count, 1);
        assert!(view.time_remaining_secs > 0);
    }
}
