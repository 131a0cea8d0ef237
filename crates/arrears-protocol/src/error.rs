//! Error types for the runtime ports.

use thiserror::Error;

/// Errors raised by port implementations (database, identity).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("unit of work already completed")]
    TransactionClosed,
    #[error("nested unit of work is not supported")]
    NestedTransaction,
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Convenience result type for port operations.
pub type PortResult<T> = Result<T, PortError>;
