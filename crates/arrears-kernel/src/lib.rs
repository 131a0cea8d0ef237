//! # arrears-kernel — module container and HTTP integration
//!
//! Turns an ordered list of [`Module`]s into a running [`Kernel`]: every
//! module's setup runs in declaration order against a growing procedure
//! registry, the registry is frozen into the bus, and only then are module
//! routes mounted behind the per-request scope middleware.

pub mod container;
pub mod error;
pub mod http;
pub mod identity;
pub mod module;

pub use container::{Kernel, ModuleContainer};
pub use error::StartupError;
pub use http::{ApiError, ApiResult, AppState, RequestContext};
pub use identity::StaticIdentities;
pub use module::{Module, ModuleReport, ModuleState, SetupContext};
