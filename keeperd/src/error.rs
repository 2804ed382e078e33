//! Daemon error types.

use keeper_domain::DomainError;
use keeper_exec::ExecError;
use keeper_store::StoreError;
use thiserror::Error;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Execution error
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Position not found
    #[error("Position not found: {0}")]
    PositionNotFound(String),

    /// A position with this trade id is already open
    #[error("Trade id already registered: {0}")]
    DuplicateTradeId(String),

    /// Registration request failed validation
    #[error("Invalid registration request: {0}")]
    InvalidRequest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
