//! Stub implementations for testing.
//!
//! These implementations simulate oracle and executor behavior without
//! making real API calls.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use keeper_domain::{Price, TokenSymbol};

use crate::error::ExecError;
use crate::ports::{PriceOracle, SwapExecutor, SwapReceipt, SwapRequest};

// =============================================================================
// Stub Oracle
// =============================================================================

/// Stub price oracle for testing.
///
/// Prices are injected per symbol; unknown symbols fail the fetch the way a
/// real oracle fails on an unlisted token.
pub struct StubOracle {
    /// Current prices by symbol
    prices: RwLock<HashMap<String, Decimal>>,
    /// Whether to fail the next fetch
    fail_next: RwLock<bool>,
}

impl StubOracle {
    /// Create an empty stub oracle.
    pub fn new() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            fail_next: RwLock::new(false),
        }
    }

    /// Set the price for a symbol.
    pub fn set_price(&self, symbol: &TokenSymbol, price: Decimal) {
        let mut prices = self.prices.write().unwrap();
        prices.insert(symbol.as_str().to_string(), price);
    }

    /// Remove a symbol so subsequent fetches fail.
    pub fn remove_price(&self, symbol: &TokenSymbol) {
        let mut prices = self.prices.write().unwrap();
        prices.remove(symbol.as_str());
    }

    /// Configure the next fetch to fail.
    pub fn set_fail_next(&self, fail: bool) {
        let mut fail_next = self.fail_next.write().unwrap();
        *fail_next = fail;
    }

    fn should_fail(&self) -> bool {
        let mut fail_next = self.fail_next.write().unwrap();
        let fail = *fail_next;
        *fail_next = false; // Reset after check
        fail
    }
}

impl Default for StubOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceOracle for StubOracle {
    async fn get_price(&self, symbol: &TokenSymbol) -> Result<Price, ExecError> {
        if self.should_fail() {
            return Err(ExecError::Oracle("Simulated oracle failure".to_string()));
        }

        let prices = self.prices.read().unwrap();
        let price = prices
            .get(symbol.as_str())
            .copied()
            .ok_or_else(|| ExecError::PriceUnavailable(symbol.as_str().to_string()))?;

        Price::new(price).map_err(|e| ExecError::Oracle(e.to_string()))
    }
}

// =============================================================================
// Stub Executor
// =============================================================================

/// Stub swap executor for testing.
///
/// Records every request and counts executions so at-most-once properties
/// can be asserted. Simulated failures do not consume an execution.
pub struct StubExecutor {
    /// Every request passed to `execute`, successful or not
    requests: RwLock<Vec<SwapRequest>>,
    /// Number of successful executions
    executed: AtomicU64,
    /// Whether to fail the next execution
    fail_next: RwLock<bool>,
    /// Counter for generating tx hashes
    tx_counter: AtomicU64,
}

impl StubExecutor {
    /// Create a new stub executor.
    pub fn new() -> Self {
        Self {
            requests: RwLock::new(Vec::new()),
            executed: AtomicU64::new(0),
            fail_next: RwLock::new(false),
            tx_counter: AtomicU64::new(0),
        }
    }

    /// Configure the next execution to fail.
    pub fn set_fail_next(&self, fail: bool) {
        let mut fail_next = self.fail_next.write().unwrap();
        *fail_next = fail;
    }

    /// Number of successful executions so far.
    pub fn execution_count(&self) -> u64 {
        self.executed.load(Ordering::SeqCst)
    }

    /// All requests seen, in call order.
    pub fn requests(&self) -> Vec<SwapRequest> {
        self.requests.read().unwrap().clone()
    }

    fn should_fail(&self) -> bool {
        let mut fail_next = self.fail_next.write().unwrap();
        let fail = *fail_next;
        *fail_next = false;
        fail
    }
}

impl Default for StubExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SwapExecutor for StubExecutor {
    async fn execute(&self, request: &SwapRequest) -> Result<SwapReceipt, ExecError> {
        {
            let mut requests = self.requests.write().unwrap();
            requests.push(request.clone());
        }

        if self.should_fail() {
            return Err(ExecError::Executor("Simulated executor failure".to_string()));
        }

        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.executed.fetch_add(1, Ordering::SeqCst);

        Ok(SwapReceipt {
            tx_hash: format!("0xstub{:08x}", n),
            executed_at: Utc::now(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_domain::{Amount, Side};
    use rust_decimal_macros::dec;

    fn sample_request() -> SwapRequest {
        SwapRequest {
            trade_id: "t-1".to_string(),
            user_id: "u-1".to_string(),
            safe_address: "0xsafe".to_string(),
            network_key: "base".to_string(),
            token_symbol: TokenSymbol::new("ETH").unwrap(),
            side: Side::Sell,
            amount: Amount::new(dec!(0.1)).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_stub_oracle_set_and_get() {
        let oracle = StubOracle::new();
        let eth = TokenSymbol::new("ETH").unwrap();

        oracle.set_price(&eth, dec!(2400));

        let price = oracle.get_price(&eth).await.unwrap();
        assert_eq!(price.as_decimal(), dec!(2400));
    }

    #[tokio::test]
    async fn test_stub_oracle_unknown_symbol_fails() {
        let oracle = StubOracle::new();
        let sol = TokenSymbol::new("SOL").unwrap();

        let result = oracle.get_price(&sol).await;
        assert!(matches!(result, Err(ExecError::PriceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_stub_oracle_fail_next_is_transient() {
        let oracle = StubOracle::new();
        let eth = TokenSymbol::new("ETH").unwrap();
        oracle.set_price(&eth, dec!(2400));

        oracle.set_fail_next(true);
        assert!(oracle.get_price(&eth).await.is_err());

        // Next fetch succeeds
        assert!(oracle.get_price(&eth).await.is_ok());
    }

    #[tokio::test]
    async fn test_stub_oracle_removed_price_fails() {
        let oracle = StubOracle::new();
        let eth = TokenSymbol::new("ETH").unwrap();
        oracle.set_price(&eth, dec!(2400));
        oracle.remove_price(&eth);

        assert!(oracle.get_price(&eth).await.is_err());
    }

    #[tokio::test]
    async fn test_stub_executor_counts_executions() {
        let executor = StubExecutor::new();
        let request = sample_request();

        let receipt = executor.execute(&request).await.unwrap();
        assert!(receipt.tx_hash.starts_with("0xstub"));
        assert_eq!(executor.execution_count(), 1);
        assert_eq!(executor.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_stub_executor_failure_not_counted() {
        let executor = StubExecutor::new();
        let request = sample_request();

        executor.set_fail_next(true);
        assert!(executor.execute(&request).await.is_err());

        // The failed attempt is recorded but not counted as executed
        assert_eq!(executor.execution_count(), 0);
        assert_eq!(executor.requests().len(), 1);

        assert!(executor.execute(&request).await.is_ok());
        assert_eq!(executor.execution_count(), 1);
    }
}
