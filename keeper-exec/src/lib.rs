//! Keeper execution layer
//!
//! Contracts for the two external collaborators the monitoring core calls:
//!
//! - **Price oracle**: `symbol → price`, idempotent, transiently fallible
//! - **Swap executor**: reversing-trade dispatch, not idempotent; the
//!   engine's registry gate guarantees at most one call per position
//!
//! # Components
//!
//! - **Ports**: traits defining the oracle and executor interfaces
//! - **Stub**: test implementations with price injection and failure control

#![warn(clippy::all)]

pub mod error;
pub mod ports;
pub mod stub;

// Re-exports for convenience
pub use error::{ExecError, ExecResult};
pub use ports::{PriceOracle, SwapExecutor, SwapReceipt, SwapRequest};
pub use stub::{StubExecutor, StubOracle};
