//! Exit condition evaluation (pure functions)
//!
//! For a given position, price, and instant, the chosen exit kind is a pure
//! function of the fixed priority table:
//!
//! 1. `max_exit_time`: time is absolute and overrides price
//! 2. `trailing_stop` (if enabled): once engaged it tightens, never loosens,
//!    so it supersedes the static stop-loss
//! 3. `stop_loss`
//! 4. `tp2`: checked before tp1 so the more profitable target is recorded
//! 5. `tp1`
//!
//! First true wins. Thresholds are evaluated as written: ordering between
//! `sl`, `entry`, `tp1`, `tp2` is not validated upstream.

use crate::position::{ExitKind, MonitoredPosition};
use crate::trailing::is_trailing_stop_hit;
use crate::value_objects::{Price, Side};
use chrono::{DateTime, Utc};

/// Evaluate the exit conditions for one position against a live price.
///
/// Returns the highest-priority condition that holds, or `None` when the
/// position should stay open.
pub fn evaluate_exit(
    position: &MonitoredPosition,
    price: Price,
    now: DateTime<Utc>,
) -> Option<ExitKind> {
    // 1. Hard deadline
    if now >= position.max_exit_time {
        return Some(ExitKind::MaxExitTime);
    }

    // 2. Trailing stop
    if position.trailing_stop_enabled
        && is_trailing_stop_hit(position.side, price, position.trailing_stop_price)
    {
        return Some(ExitKind::TrailingStop);
    }

    let p = price.as_decimal();
    match position.side {
        Side::Buy => {
            // 3. Static stop-loss
            if p <= position.sl.as_decimal() {
                return Some(ExitKind::StopLoss);
            }
            // 4. / 5. Take-profit targets, tp2 first
            if p >= position.tp2.as_decimal() {
                return Some(ExitKind::Tp2);
            }
            if p >= position.tp1.as_decimal() {
                return Some(ExitKind::Tp1);
            }
        },
        Side::Sell => {
            if p >= position.sl.as_decimal() {
                return Some(ExitKind::StopLoss);
            }
            if p <= position.tp2.as_decimal() {
                return Some(ExitKind::Tp2);
            }
            if p <= position.tp1.as_decimal() {
                return Some(ExitKind::Tp1);
            }
        },
    }

    None
}

// =============================================================================
// Tests
// =============================================================================
