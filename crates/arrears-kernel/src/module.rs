use std::future::Future;
use std::sync::Arc;

use arrears_bus::{
    BusResult, ExecutionContext, HandlerError, ProcedureDefinition, ProcedureRegistry,
};
use arrears_protocol::{AppConfig, DatabasePort, Identity, RequestId};
use async_trait::async_trait;
use axum::Router;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::http::AppState;

/// A feature area: routes, procedures, and a one-time setup hook.
///
/// Modules are declared in a fixed order. `setup` runs once, after every
/// earlier module is ready; it registers the module's procedure handlers and
/// may call procedures registered by earlier modules. `routes` is only
/// consulted once every module has finished setup.
#[async_trait]
pub trait Module: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn setup(&self, context: &mut SetupContext<'_>) -> anyhow::Result<()>;

    fn routes(&self) -> Router<AppState> {
        Router::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    Declared,
    SettingUp,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleReport {
    pub name: String,
    pub state: ModuleState,
}

/// What a module sees while its setup hook runs.
pub struct SetupContext<'a> {
    module: &'a str,
    registry: &'a mut ProcedureRegistry,
    database: Arc<dyn DatabasePort>,
    config: Arc<AppConfig>,
}

impl<'a> SetupContext<'a> {
    pub(crate) fn new(
        module: &'a str,
        registry: &'a mut ProcedureRegistry,
        database: Arc<dyn DatabasePort>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            module,
            registry,
            database,
            config,
        }
    }

    pub fn module_name(&self) -> &str {
        self.module
    }

    pub fn database(&self) -> &Arc<dyn DatabasePort> {
        &self.database
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Registers a handler on behalf of the module being set up.
    pub fn register<P, R, F, Fut>(
        &mut self,
        definition: &ProcedureDefinition<P, R>,
        handler: F,
    ) -> BusResult<()>
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    {
        self.registry.register(self.module, definition, handler)
    }

    /// Calls a procedure as the system identity. Only procedures registered
    /// before this call are reachable; anything else fails with
    /// `ProcedureNotRegistered`.
    pub async fn exec<P, R>(&self, definition: &ProcedureDefinition<P, R>, payload: P) -> BusResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let bus = self.registry.snapshot();
        let context = ExecutionContext::builder(bus, self.database.clone(), self.config.clone())
            .identity(Some(Identity::system()))
            .request_id(RequestId::startup())
            .build();
        context.exec(definition, payload).await
    }
}
