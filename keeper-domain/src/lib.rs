//! Keeper domain layer
//!
//! Pure domain logic with zero I/O dependencies: the monitored-position
//! entity, validated value objects, trailing-stop math, and exit-condition
//! evaluation.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod exit;
pub mod position;
pub mod trailing;
pub mod value_objects;

// Re-export commonly used types
pub use exit::evaluate_exit;
pub use position::{
    ExitData, ExitKind, MonitoredPosition, NewPosition, PositionId, PositionStatus,
};
pub use trailing::{
    TrailingStopUpdate, initial_trailing_stop, is_trailing_stop_hit,
    update_trailing_stop_banded,
};
pub use value_objects::{Amount, DomainError, Price, Side, TokenSymbol};
