//! Execution layer port definitions.
//!
//! Ports define the interfaces for external services (price oracle, on-venue
//! swap execution). Adapters implement these ports for specific venues; the
//! stubs in this crate implement them for tests and development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keeper_domain::{Amount, MonitoredPosition, Price, Side, TokenSymbol};

use crate::error::ExecError;

// =============================================================================
// Price Oracle Port
// =============================================================================

/// Port for spot price quotation.
///
/// Idempotent; may fail transiently. A failed fetch skips the current tick
/// for the affected position and is never treated as terminal.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Get the current spot price for a token symbol.
    async fn get_price(&self, symbol: &TokenSymbol) -> Result<Price, ExecError>;
}

// =============================================================================
// Swap Executor Port
// =============================================================================

/// Port for on-venue swap execution.
///
/// **Not assumed idempotent.** The engine guarantees at most one `execute`
/// call per position via the registry remove gate; implementations must not
/// be retried by callers.
#[async_trait]
pub trait SwapExecutor: Send + Sync {
    /// Perform the swap and return a transaction receipt.
    async fn execute(&self, request: &SwapRequest) -> Result<SwapReceipt, ExecError>;
}

/// A swap instruction routed to the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapRequest {
    /// User-facing trade identity
    pub trade_id: String,
    /// Owning user, passed through unchanged
    pub user_id: String,
    /// Wallet the swap executes from
    pub safe_address: String,
    /// Network the swap executes on
    pub network_key: String,
    /// Token being traded
    pub token_symbol: TokenSymbol,
    /// Direction of this swap
    pub side: Side,
    /// Size of this swap
    pub amount: Amount,
}

impl SwapRequest {
    /// Build the reversing request that closes a position: opposite side,
    /// identical routing fields, full entry amount.
    pub fn reversing(position: &MonitoredPosition) -> Self {
        Self {
            trade_id: position.trade_id.clone(),
            user_id: position.user_id.clone(),
            safe_address: position.safe_address.clone(),
            network_key: position.network_key.clone(),
            token_symbol: position.token_symbol.clone(),
            side: position.side.reversed(),
            amount: position.entry_amount,
        }
    }
}

/// Receipt of a completed swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapReceipt {
    /// On-chain transaction hash
    pub tx_hash: String,
    /// When the swap completed
    pub executed_at: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================
