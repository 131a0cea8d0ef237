use std::collections::HashSet;
use std::sync::Arc;

use arrears_bus::{Bus, ExecutionContext, ProcedureRegistry};
use arrears_protocol::{AppConfig, DatabasePort, Identity, IdentityPort};
use axum::Router;
use axum::middleware;
use axum::routing::get;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, error, info, info_span, instrument};

use crate::error::StartupError;
use crate::http::{AppState, healthz, list_procedures, request_scope};
use crate::identity::StaticIdentities;
use crate::module::{Module, ModuleReport, ModuleState, SetupContext};

/// Ordered list of modules plus the collaborators they are set up with.
pub struct ModuleContainer {
    config: Arc<AppConfig>,
    database: Arc<dyn DatabasePort>,
    identities: Arc<dyn IdentityPort>,
    modules: Vec<Arc<dyn Module>>,
}

impl ModuleContainer {
    /// Identities default to the API tokens in `config.auth`.
    pub fn new(config: AppConfig, database: Arc<dyn DatabasePort>) -> Self {
        let identities = Arc::new(StaticIdentities::from_settings(&config.auth));
        Self {
            config: Arc::new(config),
            database,
            identities,
            modules: Vec::new(),
        }
    }

    pub fn identities(mut self, identities: Arc<dyn IdentityPort>) -> Self {
        self.identities = identities;
        self
    }

    /// Appends a module; setup order is declaration order.
    pub fn module(mut self, module: impl Module) -> Self {
        self.modules.push(Arc::new(module));
        self
    }

    pub fn modules(mut self, modules: impl IntoIterator<Item = Arc<dyn Module>>) -> Self {
        self.modules.extend(modules);
        self
    }

    /// Runs every module's setup in order and freezes the procedure table.
    ///
    /// The first failing setup aborts startup; no later module is set up and
    /// no router is produced.
    #[instrument(skip(self), fields(modules = self.modules.len()))]
    pub async fn start(self) -> Result<Kernel, StartupError> {
        let mut seen = HashSet::new();
        for module in &self.modules {
            if !seen.insert(module.name().to_owned()) {
                error!(module = module.name(), "duplicate module declaration");
                return Err(StartupError::DuplicateModule {
                    module: module.name().to_owned(),
                });
            }
        }

        let mut reports: Vec<ModuleReport> = self
            .modules
            .iter()
            .map(|module| ModuleReport {
                name: module.name().to_owned(),
                state: ModuleState::Declared,
            })
            .collect();
        let mut registry = ProcedureRegistry::new(self.config.bus.clone());

        for (module, report) in self.modules.iter().zip(reports.iter_mut()) {
            report.state = ModuleState::SettingUp;
            let before = registry.len();
            let mut context = SetupContext::new(
                module.name(),
                &mut registry,
                self.database.clone(),
                self.config.clone(),
            );
            let outcome = module
                .setup(&mut context)
                .instrument(info_span!("module.setup", module = module.name()))
                .await;

            if let Err(source) = outcome {
                report.state = ModuleState::Failed;
                error!(module = module.name(), error = %format!("{source:#}"), "module setup failed");
                return Err(StartupError::ModuleSetup {
                    module: module.name().to_owned(),
                    source,
                });
            }
            report.state = ModuleState::Ready;
            info!(
                module = module.name(),
                procedures = registry.len() - before,
                "module ready"
            );
        }

        let bus = registry.freeze();
        let routes = self
            .modules
            .iter()
            .fold(Router::new(), |router, module| router.merge(module.routes()));
        info!(procedures = bus.len(), "kernel started");

        Ok(Kernel {
            state: AppState {
                bus,
                database: self.database,
                identities: self.identities,
                config: self.config,
            },
            modules: reports,
            routes,
        })
    }
}

/// A started application: frozen bus, module report, mounted routes.
#[derive(Clone)]
pub struct Kernel {
    state: AppState,
    modules: Vec<ModuleReport>,
    routes: Router<AppState>,
}

impl Kernel {
    pub fn bus(&self) -> &Bus {
        &self.state.bus
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn modules(&self) -> &[ModuleReport] {
        &self.modules
    }

    /// A root context for callers outside HTTP (CLI, tests). Statements run
    /// directly against the database, outside any unit of work.
    pub fn context(&self, identity: Option<Identity>) -> ExecutionContext {
        ExecutionContext::builder(
            self.state.bus.clone(),
            self.state.database.clone(),
            self.state.config.clone(),
        )
        .identity(identity)
        .build()
    }

    /// Module routes and `/procedures` behind the request scope, plus an
    /// unauthenticated `/healthz`.
    pub fn router(&self) -> Router {
        let scoped = self
            .routes
            .clone()
            .route("/procedures", get(list_procedures))
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                request_scope,
            ));

        Router::new()
            .route("/healthz", get(healthz))
            .merge(scoped)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }
}
