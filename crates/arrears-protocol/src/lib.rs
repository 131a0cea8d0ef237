//! # arrears-protocol — shared contract types
//!
//! This crate defines the types and trait interfaces that the bus, the
//! kernel, the store, and every feature module agree on.
//!
//! It is intentionally dependency-light (no runtime deps like tokio or axum)
//! so it can be used as a pure contract crate.
//!
//! ## Module Overview
//!
//! - [`ids`] — Typed ID wrappers (RequestId, CallId)
//! - [`identity`] — Authenticated identity and roles
//! - [`config`] — AppConfig, BusSettings, AuthSettings, ApiToken
//! - [`query`] — Parameterized query and statement model
//! - [`ports`] — Runtime boundary ports (database, unit of work, identity)
//! - [`error`] — PortError, PortResult

pub mod config;
pub mod error;
pub mod identity;
pub mod ids;
pub mod ports;
pub mod query;

// Re-export the most commonly used types at the crate root.
pub use config::{ApiToken, AppConfig, AuthSettings, BusSettings, Environment};
pub use error::{PortError, PortResult};
pub use identity::{Identity, Role};
pub use ids::{CallId, RequestId};
pub use ports::{DatabasePort, IdentityPort, UnitOfWork};
pub use query::{Comparison, ExecOutcome, Filter, Order, Query, Row, Statement};
