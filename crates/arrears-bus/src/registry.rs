use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use arrears_protocol::BusSettings;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use crate::context::ExecutionContext;
use crate::dispatcher::Bus;
use crate::error::{BusError, BusResult, HandlerError};
use crate::procedure::ProcedureDefinition;

/// Why a handler invocation produced no response.
#[derive(Debug)]
pub enum CallFailure {
    /// The payload matched the schema but not the handler's payload type;
    /// the handler body never ran.
    Decode(String),
    Handler(HandlerError),
}

impl From<HandlerError> for CallFailure {
    fn from(error: HandlerError) -> Self {
        Self::Handler(error)
    }
}

/// Implementation side of a procedure. Receives an already validated payload.
#[async_trait]
pub trait ProcedureHandler: Send + Sync {
    async fn call(&self, payload: Value, context: ExecutionContext) -> Result<Value, CallFailure>;
}

struct TypedHandler<P, R, F> {
    handler: F,
    _types: PhantomData<fn(P) -> R>,
}

#[async_trait]
impl<P, R, F, Fut> ProcedureHandler for TypedHandler<P, R, F>
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(P, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
{
    async fn call(&self, payload: Value, context: ExecutionContext) -> Result<Value, CallFailure> {
        let payload = serde_json::from_value::<P>(payload)
            .map_err(|error| CallFailure::Decode(error.to_string()))?;
        let response = (self.handler)(payload, context).await?;
        serde_json::to_value(response).map_err(|error| {
            CallFailure::Handler(HandlerError::Internal(format!(
                "response encode failed: {error}"
            )))
        })
    }
}

#[derive(Clone)]
pub struct RegisteredProcedure {
    pub(crate) definition: ProcedureDefinition,
    pub(crate) handler: Arc<dyn ProcedureHandler>,
    pub(crate) module: String,
}

impl RegisteredProcedure {
    pub fn definition(&self) -> &ProcedureDefinition {
        &self.definition
    }

    /// Module whose setup registered the handler.
    pub fn module(&self) -> &str {
        &self.module
    }
}

/// Startup-phase table of handlers keyed by qualified name.
///
/// Only the module container holds a registry; once every module is set up
/// it is frozen into an immutable [`Bus`].
pub struct ProcedureRegistry {
    procedures: IndexMap<String, RegisteredProcedure>,
    settings: BusSettings,
}

impl ProcedureRegistry {
    pub fn new(settings: BusSettings) -> Self {
        Self {
            procedures: IndexMap::new(),
            settings,
        }
    }

    pub fn register<P, R, F, Fut>(
        &mut self,
        module: &str,
        definition: &ProcedureDefinition<P, R>,
        handler: F,
    ) -> BusResult<()>
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    {
        let handler = TypedHandler {
            handler,
            _types: PhantomData,
        };
        self.register_handler(module, definition, Arc::new(handler))
    }

    /// First registration wins; a second one for the same qualified name is
    /// rejected and leaves the table untouched.
    pub fn register_handler<P, R>(
        &mut self,
        module: &str,
        definition: &ProcedureDefinition<P, R>,
        handler: Arc<dyn ProcedureHandler>,
    ) -> BusResult<()> {
        let name = definition.qualified_name();
        if let Some(existing) = self.procedures.get(name) {
            error!(
                procedure = %name,
                existing_module = %existing.module,
                module,
                "duplicate procedure registration"
            );
            return Err(BusError::DuplicateRegistration {
                procedure: name.to_owned(),
                existing_module: existing.module.clone(),
                module: module.to_owned(),
            });
        }

        debug!(procedure = %name, module, "procedure registered");
        self.procedures.insert(
            name.to_owned(),
            RegisteredProcedure {
                definition: definition.erased(),
                handler,
                module: module.to_owned(),
            },
        );
        Ok(())
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.procedures.contains_key(qualified_name)
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }

    /// A bus over the procedures registered so far, for calls made while
    /// later modules are still being set up.
    pub fn snapshot(&self) -> Bus {
        Bus::from_table(self.procedures.clone(), self.settings.clone())
    }

    pub fn freeze(self) -> Bus {
        Bus::from_table(self.procedures, self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedure::ProcedureSpec;
    use crate::scope::Scope;
    use serde_json::json;

    fn definition(scope: &str, name: &str) -> ProcedureDefinition {
        Scope::new(scope)
            .unwrap()
            .define_procedure(ProcedureSpec::new(name, json!({}), json!({})))
            .unwrap()
    }

    async fn constant(_: Value, _: ExecutionContext) -> Result<Value, HandlerError> {
        Ok(json!("first"))
    }

    #[test]
    fn duplicate_registration_keeps_first_handler() {
        let mut registry = ProcedureRegistry::new(BusSettings::default());
        let get_events = definition("events", "getEvents");

        registry.register("events", &get_events, constant).unwrap();
        let error = registry
            .register("calendar", &get_events, constant)
            .unwrap_err();

        assert!(matches!(
            &error,
            BusError::DuplicateRegistration { procedure, existing_module, module }
                if procedure == "events:getEvents"
                    && existing_module == "events"
                    && module == "calendar"
        ));
        assert_eq!(registry.len(), 1);
        let bus = registry.freeze();
        assert_eq!(bus.get("events:getEvents").map(|p| p.module()), Some("events"));
    }

    #[test]
    fn same_scope_name_from_two_scopes_collides_at_registration() {
        let mut registry = ProcedureRegistry::new(BusSettings::default());
        let from_events_module = definition("events", "getEvents");
        let from_reporting_module = definition("events", "getEvents");

        registry
            .register("events", &from_events_module, constant)
            .unwrap();
        let result = registry.register("reporting", &from_reporting_module, constant);

        assert!(matches!(result, Err(BusError::DuplicateRegistration { .. })));
    }

    #[test]
    fn snapshot_does_not_see_later_registrations() {
        let mut registry = ProcedureRegistry::new(BusSettings::default());
        registry
            .register("events", &definition("events", "getEvents"), constant)
            .unwrap();
        let snapshot = registry.snapshot();
        registry
            .register("members", &definition("members", "getMember"), constant)
            .unwrap();

        assert!(snapshot.contains("events:getEvents"));
        assert!(!snapshot.contains("members:getMember"));
        assert!(registry.contains("members:getMember"));
    }
}
