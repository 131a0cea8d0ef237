//! Error taxonomy for procedure definition, registration, and dispatch.

use arrears_protocol::PortError;
use thiserror::Error;

use crate::schema::Violation;

/// Failures raised by a procedure's own logic.
///
/// The bus propagates these unchanged inside [`BusError::Handler`].
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("database error: {0}")]
    Database(#[from] PortError),
    /// A nested `exec` made by the handler failed.
    #[error("upstream procedure failed: {0}")]
    Upstream(Box<BusError>),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<BusError> for HandlerError {
    fn from(error: BusError) -> Self {
        Self::Upstream(Box::new(error))
    }
}

#[derive(Debug, Clone, Error)]
pub enum BusError {
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("invalid schema for {procedure}: {message}")]
    InvalidSchema { procedure: String, message: String },
    #[error("procedure {procedure} is already defined in this scope")]
    DuplicateDefinition { procedure: String },
    #[error(
        "procedure {procedure} registered by module {module} is already registered by module {existing_module}"
    )]
    DuplicateRegistration {
        procedure: String,
        existing_module: String,
        module: String,
    },
    #[error("procedure {procedure} is not registered")]
    ProcedureNotRegistered { procedure: String },
    #[error("invalid payload for {procedure}: {}", render_violations(.violations))]
    InvalidPayload {
        procedure: String,
        violations: Vec<Violation>,
    },
    #[error("invalid response from {procedure}: {}", render_violations(.violations))]
    InvalidResponse {
        procedure: String,
        violations: Vec<Violation>,
    },
    #[error("call depth {depth} exceeded calling {procedure}")]
    CallDepthExceeded { procedure: String, depth: usize },
    #[error("procedure {procedure} failed: {source}")]
    Handler {
        procedure: String,
        #[source]
        source: HandlerError,
    },
}

impl BusError {
    /// Qualified name of the procedure the error concerns, when there is one.
    pub fn procedure(&self) -> Option<&str> {
        match self {
            Self::InvalidName { .. } => None,
            Self::InvalidSchema { procedure, .. }
            | Self::DuplicateDefinition { procedure }
            | Self::DuplicateRegistration { procedure, .. }
            | Self::ProcedureNotRegistered { procedure }
            | Self::InvalidPayload { procedure, .. }
            | Self::InvalidResponse { procedure, .. }
            | Self::CallDepthExceeded { procedure, .. }
            | Self::Handler { procedure, .. } => Some(procedure),
        }
    }

    /// Follows `Handler(Upstream(..))` chains down to the innermost error
    /// raised by a handler or by the bus itself.
    pub fn root_cause(&self) -> &BusError {
        match self {
            Self::Handler {
                source: HandlerError::Upstream(inner),
                ..
            } => inner.root_cause(),
            other => other,
        }
    }
}

fn render_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type BusResult<T> = Result<T, BusError>;
