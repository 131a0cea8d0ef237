use arrears_bus::BusError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("module `{module}` is declared more than once")]
    DuplicateModule { module: String },
    #[error("setup of module `{module}` failed")]
    ModuleSetup {
        module: String,
        #[source]
        source: anyhow::Error,
    },
}

impl StartupError {
    pub fn module(&self) -> &str {
        match self {
            Self::DuplicateModule { module } | Self::ModuleSetup { module, .. } => module,
        }
    }

    /// The bus error that aborted a module setup, if that is what happened.
    pub fn bus_error(&self) -> Option<&BusError> {
        match self {
            Self::ModuleSetup { source, .. } => source.downcast_ref::<BusError>(),
            Self::DuplicateModule { .. } => None,
        }
    }
}
