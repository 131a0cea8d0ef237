//! # arrears-bus — in-process procedure bus
//!
//! Modules talk to each other only through procedures: named, schema-checked
//! request/response contracts dispatched by a [`Bus`].
//!
//! ## Module Overview
//!
//! - [`scope`] — Per-module namespaces that mint definitions
//! - [`procedure`] — ProcedureDefinition, ProcedureSpec
//! - [`schema`] — Compiled JSON Schema documents and violations
//! - [`registry`] — Startup-only handler table, frozen into a Bus
//! - [`dispatcher`] — The Bus: validate, dispatch, validate
//! - [`context`] — ExecutionContext handed to handlers
//! - [`error`] — BusError, HandlerError

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod procedure;
pub mod registry;
pub mod schema;
pub mod scope;

pub use context::{ExecutionContext, ExecutionContextBuilder};
pub use dispatcher::{Bus, ProcedureInfo};
pub use error::{BusError, BusResult, HandlerError};
pub use procedure::{ProcedureDefinition, ProcedureSpec};
pub use registry::{CallFailure, ProcedureHandler, ProcedureRegistry, RegisteredProcedure};
pub use schema::{Schema, Violation};
pub use scope::Scope;
