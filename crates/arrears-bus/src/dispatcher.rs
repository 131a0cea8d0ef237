use std::sync::Arc;
use std::time::{Duration, Instant};

use arrears_protocol::{BusSettings, CallId};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::context::ExecutionContext;
use crate::error::{BusError, BusResult};
use crate::procedure::ProcedureDefinition;
use crate::registry::{CallFailure, RegisteredProcedure};
use crate::schema::Violation;

/// Read-only description of a registered procedure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureInfo {
    pub qualified_name: String,
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub payload_schema: Value,
    pub response_schema: Value,
}

struct BusInner {
    procedures: IndexMap<String, RegisteredProcedure>,
    settings: BusSettings,
}

/// Dispatcher over a fixed procedure table.
///
/// Every call validates the payload, resolves the handler, runs it, and
/// validates the response, in that order. The table never changes after
/// construction, so clones share it without locking.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

impl Bus {
    pub(crate) fn from_table(
        procedures: IndexMap<String, RegisteredProcedure>,
        settings: BusSettings,
    ) -> Self {
        Self {
            inner: Arc::new(BusInner {
                procedures,
                settings,
            }),
        }
    }

    pub fn empty(settings: BusSettings) -> Self {
        Self::from_table(IndexMap::new(), settings)
    }

    pub fn settings(&self) -> &BusSettings {
        &self.inner.settings
    }

    pub fn get(&self, qualified_name: &str) -> Option<&RegisteredProcedure> {
        self.inner.procedures.get(qualified_name)
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.inner.procedures.contains_key(qualified_name)
    }

    pub fn len(&self) -> usize {
        self.inner.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.procedures.is_empty()
    }

    /// Registered procedures in registration order.
    pub fn procedures(&self) -> impl Iterator<Item = ProcedureInfo> + '_ {
        self.inner
            .procedures
            .iter()
            .map(|(name, registered)| ProcedureInfo {
                qualified_name: name.clone(),
                module: registered.module.clone(),
                description: registered.definition.description().map(ToOwned::to_owned),
                payload_schema: registered.definition.payload_schema().document().clone(),
                response_schema: registered.definition.response_schema().document().clone(),
            })
    }

    pub async fn exec<P, R>(
        &self,
        context: &ExecutionContext,
        definition: &ProcedureDefinition<P, R>,
        payload: P,
    ) -> BusResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_value(payload).map_err(|error| BusError::InvalidPayload {
            procedure: definition.qualified_name().to_owned(),
            violations: vec![Violation::root(format!("payload is not serializable: {error}"))],
        })?;
        let response = self.exec_value(context, definition, payload).await?;
        serde_json::from_value(response).map_err(|error| {
            error!(
                procedure = %definition.qualified_name(),
                %error,
                "response passed schema validation but does not decode"
            );
            BusError::InvalidResponse {
                procedure: definition.qualified_name().to_owned(),
                violations: vec![Violation::root(error.to_string())],
            }
        })
    }

    pub async fn exec_value<P, R>(
        &self,
        context: &ExecutionContext,
        definition: &ProcedureDefinition<P, R>,
        payload: Value,
    ) -> BusResult<Value> {
        let procedure = definition.qualified_name();

        if let Err(violations) = definition.payload_schema().validate(&payload) {
            debug!(
                procedure,
                request_id = %context.request_id(),
                violations = violations.len(),
                "payload rejected"
            );
            return Err(BusError::InvalidPayload {
                procedure: procedure.to_owned(),
                violations,
            });
        }

        let Some(registered) = self.inner.procedures.get(procedure) else {
            error!(
                procedure,
                request_id = %context.request_id(),
                caller = ?context.procedure(),
                "procedure not registered"
            );
            return Err(BusError::ProcedureNotRegistered {
                procedure: procedure.to_owned(),
            });
        };

        let depth = context.depth() + 1;
        if depth > self.inner.settings.max_call_depth {
            warn!(
                procedure,
                depth,
                max_call_depth = self.inner.settings.max_call_depth,
                caller = ?context.procedure(),
                "call depth exceeded"
            );
            return Err(BusError::CallDepthExceeded {
                procedure: procedure.to_owned(),
                depth,
            });
        }

        let call_id = CallId::default();
        let span = info_span!(
            parent: context.span(),
            "bus.exec",
            procedure,
            module = %registered.module,
            request_id = %context.request_id(),
            call_id = %call_id,
            depth
        );
        let nested = context.nested(self.clone(), procedure, span.clone());

        let started = Instant::now();
        let outcome = registered
            .handler
            .call(payload, nested)
            .instrument(span.clone())
            .await;
        let elapsed = started.elapsed();

        let response = outcome.map_err(|failure| match failure {
            CallFailure::Decode(message) => {
                debug!(parent: &span, %message, "payload does not decode into the handler's type");
                BusError::InvalidPayload {
                    procedure: procedure.to_owned(),
                    violations: vec![Violation::root(message)],
                }
            }
            CallFailure::Handler(source) => {
                debug!(parent: &span, %source, "handler failed");
                BusError::Handler {
                    procedure: procedure.to_owned(),
                    source,
                }
            }
        })?;

        if let Err(violations) = definition.response_schema().validate(&response) {
            error!(
                parent: &span,
                module = %registered.module,
                violations = ?violations,
                "handler returned a response violating its declared contract"
            );
            return Err(BusError::InvalidResponse {
                procedure: procedure.to_owned(),
                violations,
            });
        }

        let threshold = Duration::from_millis(self.inner.settings.slow_call_threshold_ms);
        if elapsed > threshold {
            warn!(
                parent: &span,
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = self.inner.settings.slow_call_threshold_ms,
                "slow procedure call"
            );
        }

        Ok(response)
    }

    /// Dispatches by qualified name using the registered contract.
    pub async fn exec_by_name(
        &self,
        context: &ExecutionContext,
        qualified_name: &str,
        payload: Value,
    ) -> BusResult<Value> {
        let definition = self
            .inner
            .procedures
            .get(qualified_name)
            .map(|registered| registered.definition.clone())
            .ok_or_else(|| BusError::ProcedureNotRegistered {
                procedure: qualified_name.to_owned(),
            })?;
        self.exec_value(context, &definition, payload).await
    }
}
