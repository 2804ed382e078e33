//! Trailing stop logic (pure functions)
//!
//! The trailing stop is a proportional band below (buy) or above (sell)
//! the most favorable price observed since entry:
//! - BUY:  stop = highest_observed × (1 − ε)
//! - SELL: stop = lowest_observed × (1 + ε)
//!
//! Key invariants:
//! - The favorable extreme is monotonic (highs only rise for buy, lows only
//!   fall for sell)
//! - The stop only moves when the price makes a new favorable extreme, so it
//!   tightens and never loosens

use crate::value_objects::{Price, Side};
use rust_decimal::Decimal;

/// Result of a trailing stop update
///
/// Returned when the price made a new favorable extreme; `None` otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingStopUpdate {
    /// New trailing stop price
    pub new_stop: Price,
    /// New favorable extreme (high for Buy, low for Sell)
    pub new_favorable_extreme: Price,
}

/// Compute the initial trailing stop at registration or rehydrate time
///
/// Seeded from the entry price before any ticks have been observed:
/// `entry × (1 − ε)` for Buy, `entry × (1 + ε)` for Sell.
pub fn initial_trailing_stop(side: Side, entry_price: Price, epsilon: Decimal) -> Price {
    let entry = entry_price.as_decimal();
    let stop = match side {
        Side::Buy => entry * (Decimal::ONE - epsilon),
        Side::Sell => entry * (Decimal::ONE + epsilon),
    };
    Price::from(stop)
}

/// Update the trailing stop using the proportional band
///
/// Only updates when the price makes a new favorable extreme (new high for
/// Buy, new low for Sell). The returned stop is derived from the new extreme.
///
/// # Examples
///
/// ```
/// # use keeper_domain::trailing::update_trailing_stop_banded;
/// # use keeper_domain::value_objects::{Price, Side};
/// # use rust_decimal_macros::dec;
/// // BUY with ε = 0.01: a new high at 2495 moves the stop to 2470.05
/// let update = update_trailing_stop_banded(
///     Side::Buy,
///     Price::new(dec!(2495)).unwrap(),
///     Price::new(dec!(2480)).unwrap(),
///     dec!(0.01),
/// );
/// assert!(update.is_some());
/// let update = update.unwrap();
/// assert_eq!(update.new_stop.as_decimal(), dec!(2470.05));
/// assert_eq!(update.new_favorable_extreme.as_decimal(), dec!(2495));
///
/// // A pullback below the extreme is not a new high: no update
/// let update = update_trailing_stop_banded(
///     Side::Buy,
///     Price::new(dec!(2479)).unwrap(),
///     Price::new(dec!(2495)).unwrap(),
///     dec!(0.01),
/// );
/// assert!(update.is_none());
/// ```
pub fn update_trailing_stop_banded(
    side: Side,
    current_price: Price,
    favorable_extreme: Price,
    epsilon: Decimal,
) -> Option<TrailingStopUpdate> {
    let price = current_price.as_decimal();
    let extreme = favorable_extreme.as_decimal();

    match side {
        Side::Buy => {
            if price > extreme {
                Some(TrailingStopUpdate {
                    new_stop: Price::from(price * (Decimal::ONE - epsilon)),
                    new_favorable_extreme: current_price,
                })
            } else {
                None
            }
        },
        Side::Sell => {
            if price < extreme {
                Some(TrailingStopUpdate {
                    new_stop: Price::from(price * (Decimal::ONE + epsilon)),
                    new_favorable_extreme: current_price,
                })
            } else {
                None
            }
        },
    }
}

/// Check if the trailing stop is hit (should exit)
///
/// - Buy: exit when `price <= stop`
/// - Sell: exit when `price >= stop`
pub fn is_trailing_stop_hit(side: Side, current_price: Price, trailing_stop: Price) -> bool {
    match side {
        Side::Buy => current_price.as_decimal() <= trailing_stop.as_decimal(),
        Side::Sell => current_price.as_decimal() >= trailing_stop.as_decimal(),
    }
}

// =============================================================================
// Tests
// =============================================================================
