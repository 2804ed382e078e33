//! Event bus for engine lifecycle notifications.
//!
//! The engine emits a small set of typed lifecycle events:
//! - `PositionAdded`: a position entered monitoring (registration or adoption)
//! - `PositionExited`: the reversing trade completed
//! - `PositionExitFailed`: the exit attempt failed terminally
//!
//! Uses tokio broadcast channels for multi-producer/multi-consumer fan-out
//! with bounded buffering; slow consumers observe lag instead of blocking
//! producers. No per-subscriber identity is tracked.

use chrono::{DateTime, Utc};
use keeper_domain::{ExitKind, PositionId, Price};
use rust_decimal::Decimal;
use tokio::sync::broadcast;

// =============================================================================
// Event Types
// =============================================================================

/// Lifecycle events emitted by the monitor engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A position entered monitoring
    PositionAdded {
        /// Durable position id
        position_id: PositionId,
        /// User-facing trade id
        trade_id: String,
        /// Token under monitoring
        token_symbol: String,
        /// When the position entered the registry
        timestamp: DateTime<Utc>,
    },

    /// The reversing trade completed and the position is terminal
    PositionExited {
        /// Durable position id
        position_id: PositionId,
        /// User-facing trade id
        trade_id: String,
        /// Which condition triggered the exit
        kind: ExitKind,
        /// Price at trigger time
        exit_price: Price,
        /// Realized profit and loss
        profit_loss: Decimal,
        /// Transaction hash of the reversing trade
        tx_hash: String,
        /// Operator-supplied reason for manual exits
        reason: Option<String>,
        /// When the exit completed
        timestamp: DateTime<Utc>,
    },

    /// The exit attempt failed; operator intervention is required
    PositionExitFailed {
        /// Durable position id
        position_id: PositionId,
        /// User-facing trade id
        trade_id: String,
        /// Error reported by the executor or store
        error: String,
        /// When the failure was recorded
        timestamp: DateTime<Utc>,
    },
}

// =============================================================================
// Event Bus
// =============================================================================

/// Event bus for engine-wide lifecycle notifications.
///
/// Multiple producers can send events, and multiple consumers can receive.
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified capacity.
    ///
    /// Capacity determines how many events can be buffered before slow
    /// receivers start missing events (lagging).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event; 0 when there
    /// are no active receivers.
    pub fn send(&self, event: EngineEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events sent after this call.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Receiver for engine events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<EngineEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` if the sender has been dropped.
    /// Returns an error description if the receiver lagged (missed events).
    pub async fn recv(&mut self) -> Option<Result<EngineEvent, String>> {
        match self.receiver.recv().await {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::RecvError::Closed) => None,
            Err(broadcast::error::RecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            },
        }
    }

    /// Try to receive an event without blocking.
    ///
    /// Returns `None` if no event is immediately available.
    pub fn try_recv(&mut self) -> Option<Result<EngineEvent, String>> {
        match self.receiver.try_recv() {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Closed) => None,
            Err(broadcast::error::TryRecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
