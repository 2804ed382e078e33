//! Monitored position entity and its terminal records.
//!
//! A `MonitoredPosition` is created when an entry trade has been placed and
//! lives until an exit condition fires. Status moves one way:
//! `Active → Exited` or `Active → Failed`; terminal states are frozen.

use crate::trailing::initial_trailing_stop;
use crate::value_objects::{Amount, Price, Side, TokenSymbol};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a monitored position
pub type PositionId = Uuid;

// =============================================================================
// Status & exit kinds
// =============================================================================

/// Position lifecycle status.
///
/// Transitions only `Active → Exited` or `Active → Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    /// Being monitored for exit
    Active,
    /// Reversing trade completed
    Exited,
    /// Exit attempt failed, operator intervention required
    Failed,
}

impl PositionStatus {
    /// Wire/storage name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Active => "active",
            PositionStatus::Exited => "exited",
            PositionStatus::Failed => "failed",
        }
    }

    /// Terminal states are frozen
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PositionStatus::Active)
    }
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which exit condition triggered the reversing trade.
///
/// The ordering of the variants matches the evaluation priority: time beats
/// every price condition, the trailing stop supersedes the static stop-loss,
/// and the more profitable target is recorded when both are satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitKind {
    /// Hard wall-clock deadline reached
    MaxExitTime,
    /// Adaptive stop hit
    TrailingStop,
    /// Static stop-loss hit
    StopLoss,
    /// Second take-profit hit
    Tp2,
    /// First take-profit hit
    Tp1,
    /// Operator-initiated exit
    Manual,
}

impl ExitKind {
    /// Wire/storage name of the exit kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitKind::MaxExitTime => "max_exit_time",
            ExitKind::TrailingStop => "trailing_stop",
            ExitKind::StopLoss => "stop_loss",
            ExitKind::Tp2 => "tp2",
            ExitKind::Tp1 => "tp1",
            ExitKind::Manual => "manual",
        }
    }
}

impl std::fmt::Display for ExitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Exit record
// =============================================================================

/// Terminal record appended when a position leaves `Active`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExitData {
    /// Reversing trade completed on-venue
    Completed {
        /// Condition that triggered the exit
        kind: ExitKind,
        /// Price at trigger time
        exit_price: Price,
        /// Liquidated amount (always the full entry amount)
        exit_amount: Amount,
        /// Realized profit and loss in quote units
        profit_loss: Decimal,
        /// When the exit completed
        exited_at: DateTime<Utc>,
    },
    /// Executor or terminal write failed
    Failed {
        /// Error description for the operator
        error: String,
        /// When the failure was recorded
        failed_at: DateTime<Utc>,
    },
}

// =============================================================================
// Monitored position
// =============================================================================

/// Entry parameters supplied by the intake collaborator once the entry trade
/// has been placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPosition {
    /// User-facing identity, unique per open position
    pub trade_id: String,
    /// Owning user, passed unchanged to the executor
    pub user_id: String,
    /// On-chain wallet routed through, passed unchanged to the executor
    pub safe_address: String,
    /// Network the swap executes on, passed unchanged to the executor
    pub network_key: String,
    /// Key into the price oracle
    pub token_symbol: TokenSymbol,
    /// Direction of the entry trade
    pub side: Side,
    /// Fill price of the entry trade
    pub entry_price: Price,
    /// Size of the entry trade, used whole for the exit
    pub entry_amount: Amount,
    /// First take-profit threshold
    pub tp1: Price,
    /// Second take-profit threshold
    pub tp2: Price,
    /// Static stop-loss threshold
    pub sl: Price,
    /// Hard wall-clock deadline
    pub max_exit_time: DateTime<Utc>,
    /// Transaction hash of the entry trade, if known
    pub entry_tx_hash: Option<String>,
}

/// One open position under monitoring.
///
/// Threshold ordering (`sl < entry < tp1 ≤ tp2` for buy, mirrored for sell)
/// is NOT validated here; conditions evaluate as written, so an ill-ordered
/// position exits on its first price check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredPosition {
    /// Durable identity, stable for the position's lifetime
    pub id: PositionId,
    /// User-facing identity
    pub trade_id: String,
    /// Owning user
    pub user_id: String,
    /// Wallet address routed to the executor
    pub safe_address: String,
    /// Execution network key
    pub network_key: String,
    /// Oracle key
    pub token_symbol: TokenSymbol,
    /// Entry direction
    pub side: Side,
    /// Entry fill price, fixed at registration
    pub entry_price: Price,
    /// Entry size, fixed at registration
    pub entry_amount: Amount,
    /// First take-profit threshold
    pub tp1: Price,
    /// Second take-profit threshold
    pub tp2: Price,
    /// Static stop-loss threshold
    pub sl: Price,
    /// Hard deadline after which the position is closed regardless of price
    pub max_exit_time: DateTime<Utc>,
    /// Entry transaction hash, if the intake supplied one
    pub entry_tx_hash: Option<String>,
    /// Lifecycle status
    pub status: PositionStatus,
    /// Price observed on the most recent check
    pub current_price: Option<Price>,
    /// Most favorable price since entry: highest observed for buy, lowest
    /// observed for sell (the name follows the buy case)
    pub highest_favorable_price: Price,
    /// Adaptive stop derived from the favorable extreme
    pub trailing_stop_price: Price,
    /// Whether the trailing stop participates in exit evaluation
    pub trailing_stop_enabled: bool,
    /// Number of completed price checks
    pub price_check_count: u64,
    /// When the last price check ran
    pub last_price_check: Option<DateTime<Utc>>,
    /// When the entry trade executed
    pub executed_at: DateTime<Utc>,
    /// Terminal record, present once status is terminal
    pub exit_data: Option<ExitData>,
    /// Audit timestamps
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl MonitoredPosition {
    /// Open a new position in `Active` status.
    ///
    /// Seeds the trailing tracker from the entry price: the favorable extreme
    /// starts at entry and the stop at `entry × (1 ∓ ε)`.
    pub fn open(entry: NewPosition, trailing_stop_enabled: bool, epsilon: Decimal) -> Self {
        let now = Utc::now();
        let trailing_stop_price = initial_trailing_stop(entry.side, entry.entry_price, epsilon);

        Self {
            id: Uuid::now_v7(),
            trade_id: entry.trade_id,
            user_id: entry.user_id,
            safe_address: entry.safe_address,
            network_key: entry.network_key,
            token_symbol: entry.token_symbol,
            side: entry.side,
            entry_price: entry.entry_price,
            entry_amount: entry.entry_amount,
            tp1: entry.tp1,
            tp2: entry.tp2,
            sl: entry.sl,
            max_exit_time: entry.max_exit_time,
            entry_tx_hash: entry.entry_tx_hash,
            status: PositionStatus::Active,
            current_price: None,
            highest_favorable_price: entry.entry_price,
            trailing_stop_price,
            trailing_stop_enabled,
            price_check_count: 0,
            last_price_check: None,
            executed_at: now,
            exit_data: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Re-seed the trailing tracker after rehydration from the store.
    ///
    /// A rehydrated position restarts its extremum tracking from the entry
    /// price; monitoring counters are preserved as loaded.
    pub fn reseed_trailing(&mut self, epsilon: Decimal) {
        self.highest_favorable_price = self.entry_price;
        self.trailing_stop_price = initial_trailing_stop(self.side, self.entry_price, epsilon);
    }

    /// Record a completed price check.
    pub fn record_price_check(&mut self, price: Price, now: DateTime<Utc>) {
        self.current_price = Some(price);
        self.last_price_check = Some(now);
        self.price_check_count += 1;
        self.updated_at = now;
    }

    /// Realized profit and loss for an exit at `exit_price`.
    ///
    /// Buy: `amount × (exit − entry)`. Sell: `amount × (entry − exit)`.
    pub fn profit_loss(&self, exit_price: Price) -> Decimal {
        let entry_value = self.entry_amount.as_decimal() * self.entry_price.as_decimal();
        let exit_value = self.entry_amount.as_decimal() * exit_price.as_decimal();

        match self.side {
            Side::Buy => exit_value - entry_value,
            Side::Sell => entry_value - exit_value,
        }
    }

    /// Time left until the hard deadline, clamped at zero.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        let remaining = self.max_exit_time - now;
        if remaining < Duration::zero() {
            Duration::zero()
        } else {
            remaining
        }
    }

    /// Whether the position is still being monitored.
    pub fn is_active(&self) -> bool {
        matches!(self.status, PositionStatus::Active)
    }

    /// The price a manual exit is quoted at: the last observed price, or the
    /// entry price before any check has completed.
    pub fn last_known_price(&self) -> Price {
        self.current_price.unwrap_or(self.entry_price)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_entry(side: Side) -> NewPosition {
        NewPosition {
            trade_id: "trade-1".to_string(),
            user_id: "user-1".to_string(),
            safe_address: "0xsafe".to_string(),
            network_key: "base".to_string(),
            token_symbol: TokenSymbol::new("ETH").unwrap(),
            side,
            entry_price: Price::new(dec!(2400)).unwrap(),
            entry_amount: Amount::new(dec!(0.1)).unwrap(),
            tp1: Price::new(dec!(2500)).unwrap(),
            tp2: Price::new(dec!(2600)).unwrap(),
            sl: Price::new(dec!(2350)).unwrap(),
            max_exit_time: Utc::now() + Duration::hours(1),
            entry_tx_hash: Some("0xentry".to_string()),
        }
    }

    #[test]
    fn test_open_seeds_trailing_tracker() {
        let position = MonitoredPosition::open(sample_entry(Side::Buy), true, dec!(0.01));

        assert_eq!(position.status, PositionStatus::Active);
        assert_eq!(position.highest_favorable_price.as_decimal(), dec!(2400));
        assert_eq!(position.trailing_stop_price.as_decimal(), dec!(2376.00));
        assert_eq!(position.price_check_count, 0);
        assert!(position.current_price.is_none());
        assert!(position.exit_data.is_none());
    }

    #[test]
    fn test_open_sell_seeds_stop_above_entry() {
        let position = MonitoredPosition::open(sample_entry(Side::Sell), true, dec!(0.01));
        assert_eq!(position.trailing_stop_price.as_decimal(), dec!(2424.00));
    }

    #[test]
    fn test_record_price_check() {
        let mut position = MonitoredPosition::open(sample_entry(Side::Buy), true, dec!(0.01));
        let now = Utc::now();

        position.record_price_check(Price::new(dec!(2410)).unwrap(), now);

        assert_eq!(position.price_check_count, 1);
        assert_eq!(position.current_price.unwrap().as_decimal(), dec!(2410));
        assert_eq!(position.last_price_check, Some(now));
    }

    #[test]
    fn test_profit_loss_buy() {
        let position = MonitoredPosition::open(sample_entry(Side::Buy), true, dec!(0.01));

        let pnl = position.profit_loss(Price::new(dec!(2505)).unwrap());
        assert_eq!(pnl, dec!(10.5));
    }

    #[test]
    fn test_profit_loss_sell_sign_inverted() {
        let mut entry = sample_entry(Side::Sell);
        entry.entry_price = Price::new(dec!(100)).unwrap();
        entry.entry_amount = Amount::new(dec!(1)).unwrap();
        let position = MonitoredPosition::open(entry, true, dec!(0.01));

        let pnl = position.profit_loss(Price::new(dec!(89)).unwrap());
        assert_eq!(pnl, dec!(11));
    }

    #[test]
    fn test_profit_loss_round_trip_is_zero() {
        let position = MonitoredPosition::open(sample_entry(Side::Buy), true, dec!(0.01));

        let pnl = position.profit_loss(position.entry_price);
        assert_eq!(pnl, Decimal::ZERO);
    }

    #[test]
    fn test_time_remaining_clamps_at_zero() {
        let mut entry = sample_entry(Side::Buy);
        entry.max_exit_time = Utc::now() - Duration::minutes(5);
        let position = MonitoredPosition::open(entry, true, dec!(0.01));

        assert_eq!(position.time_remaining(Utc::now()), Duration::zero());
    }

    #[test]
    fn test_reseed_trailing_resets_extremum() {
        let mut position = MonitoredPosition::open(sample_entry(Side::Buy), true, dec!(0.01));
        position.highest_favorable_price = Price::new(dec!(2500)).unwrap();
        position.trailing_stop_price = Price::new(dec!(2475)).unwrap();

        position.reseed_trailing(dec!(0.01));

        assert_eq!(position.highest_favorable_price.as_decimal(), dec!(2400));
        assert_eq!(position.trailing_stop_price.as_decimal(), dec!(2376.00));
    }

    #[test]
    fn test_last_known_price_falls_back_to_entry() {
        let mut position = MonitoredPosition::open(sample_entry(Side::Buy), true, dec!(0.01));
        assert_eq!(position.last_known_price().as_decimal(), dec!(2400));

        position.record_price_check(Price::new(dec!(2450)).unwrap(), Utc::now());
        assert_eq!(position.last_known_price().as_decimal(), dec!(2450));
    }

    #[test]
    fn test_status_terminality() {
        assert!(!PositionStatus::Active.is_terminal());
        assert!(PositionStatus::Exited.is_terminal());
        assert!(PositionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_exit_kind_wire_names() {
        assert_eq!(ExitKind::MaxExitTime.as_str(), "max_exit_time");
        assert_eq!(ExitKind::TrailingStop.as_str(), "trailing_stop");
        assert_eq!(ExitKind::StopLoss.as_str(), "stop_loss");
        assert_eq!(ExitKind::Tp2.as_str(), "tp2");
        assert_eq!(ExitKind::Tp1.as_str(), "tp1");
        assert_eq!(ExitKind::Manual.as_str(), "manual");
    }

    #[test]
    fn test_exit_data_serde_round_trip() {
        let data = ExitData::Completed {
            kind: ExitKind::Tp1,
            exit_price: Price::new(dec!(2505)).unwrap(),
            exit_amount: Amount::new(dec!(0.1)).unwrap(),
            profit_loss: dec!(10.5),
            exited_at: Utc::now(),
        };

        let json = serde_json::to_string(&data).unwrap();
        assert!(json.contains("\"outcome\":\"completed\""));
        assert!(json.contains("\"kind\":\"tp1\""));

        let parsed: ExitData = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, data);
    }
}
