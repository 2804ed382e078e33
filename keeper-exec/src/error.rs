//! Execution layer errors.

use thiserror::Error;

/// Errors from the price oracle and swap executor adapters.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Price oracle failure (transient: the tick is skipped)
    #[error("Oracle error: {0}")]
    Oracle(String),

    /// No quote available for the requested symbol
    #[error("No price for symbol: {0}")]
    PriceUnavailable(String),

    /// Swap executor failure (terminal for the position)
    #[error("Executor error: {0}")]
    Executor(String),

    /// Adapter call exceeded its bound
    #[error("Timed out: {0}")]
    Timeout(String),
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
