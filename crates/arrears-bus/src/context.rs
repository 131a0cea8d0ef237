//! Execution context threaded into every handler and route.

use std::sync::Arc;

use arrears_protocol::{AppConfig, DatabasePort, Identity, RequestId, Role};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::Span;

use crate::dispatcher::Bus;
use crate::error::{BusResult, HandlerError};
use crate::procedure::ProcedureDefinition;

/// The dependencies a handler may use, assembled once per request.
///
/// Nested calls receive a derived context: same database handle, identity,
/// config, and request id; depth plus one; a child span. The receiving
/// procedure is recorded as `procedure` and the one that made the call as
/// `caller`. Contexts are never mutated after construction.
#[derive(Clone)]
pub struct ExecutionContext {
    bus: Bus,
    database: Arc<dyn DatabasePort>,
    identity: Option<Identity>,
    config: Arc<AppConfig>,
    request_id: RequestId,
    span: Span,
    depth: usize,
    procedure: Option<String>,
    caller: Option<String>,
}

impl ExecutionContext {
    pub fn builder(
        bus: Bus,
        database: Arc<dyn DatabasePort>,
        config: Arc<AppConfig>,
    ) -> ExecutionContextBuilder {
        ExecutionContextBuilder {
            bus,
            database,
            config,
            identity: None,
            request_id: None,
            span: None,
        }
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn database(&self) -> &Arc<dyn DatabasePort> {
        &self.database
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Number of `exec` frames above this context; 0 at the request root.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Qualified name of the procedure whose handler received this context.
    pub fn procedure(&self) -> Option<&str> {
        self.procedure.as_deref()
    }

    /// Qualified name of the procedure that invoked [`procedure`](Self::procedure);
    /// `None` when it was called from the request root.
    pub fn caller(&self) -> Option<&str> {
        self.caller.as_deref()
    }

    pub async fn exec<P, R>(&self, definition: &ProcedureDefinition<P, R>, payload: P) -> BusResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.bus.exec(self, definition, payload).await
    }

    pub async fn exec_value<P, R>(
        &self,
        definition: &ProcedureDefinition<P, R>,
        payload: Value,
    ) -> BusResult<Value> {
        self.bus.exec_value(self, definition, payload).await
    }

    pub fn require_identity(&self) -> Result<&Identity, HandlerError> {
        self.identity
            .as_ref()
            .ok_or_else(|| HandlerError::Unauthenticated("an authenticated caller is required".to_owned()))
    }

    pub fn require_role(&self, role: Role) -> Result<&Identity, HandlerError> {
        let identity = self.require_identity()?;
        if identity.has_role(role) {
            Ok(identity)
        } else {
            Err(HandlerError::Forbidden(format!(
                "{} lacks role {role}",
                identity.subject
            )))
        }
    }

    pub(crate) fn nested(&self, bus: Bus, procedure: &str, span: Span) -> Self {
        Self {
            bus,
            database: self.database.clone(),
            identity: self.identity.clone(),
            config: self.config.clone(),
            request_id: self.request_id.clone(),
            span,
            depth: self.depth + 1,
            procedure: Some(procedure.to_owned()),
            caller: self.procedure.clone(),
        }
    }
}

pub struct ExecutionContextBuilder {
    bus: Bus,
    database: Arc<dyn DatabasePort>,
    config: Arc<AppConfig>,
    identity: Option<Identity>,
    request_id: Option<RequestId>,
    span: Option<Span>,
}

impl ExecutionContextBuilder {
    pub fn identity(mut self, identity: Option<Identity>) -> Self {
        self.identity = identity;
        self
    }

    pub fn request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> ExecutionContext {
        ExecutionContext {
            bus: self.bus,
            database: self.database,
            identity: self.identity,
            config: self.config,
            request_id: self.request_id.unwrap_or_default(),
            span: self.span.unwrap_or_else(Span::current),
            depth: 0,
            procedure: None,
            caller: None,
        }
    }
}
