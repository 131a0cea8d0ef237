//! Runtime ports consumed by the bus and the kernel.
//!
//! These traits are the only boundary between the bus runtime and its
//! external collaborators (relational database, authentication).
//!
//! Object-safety note:
//! - Traits use `async-trait` for async dyn-dispatch.
//! - Handles are shared as `Arc<dyn ...>` inside execution contexts.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PortResult;
use crate::identity::Identity;
use crate::query::{ExecOutcome, Query, Row, Statement};

#[async_trait]
pub trait DatabasePort: Send + Sync {
    async fn query(&self, query: &Query) -> PortResult<Vec<Row>>;

    async fn execute(&self, statement: &Statement) -> PortResult<ExecOutcome>;

    /// Opens a unit of work scoped to one request.
    async fn begin(&self) -> PortResult<Arc<dyn UnitOfWork>>;

    async fn query_one(&self, query: &Query) -> PortResult<Option<Row>> {
        let mut rows = self.query(query).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }
}

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Database handle whose reads and writes belong to this unit of work.
    fn database(&self) -> Arc<dyn DatabasePort>;

    async fn commit(&self) -> PortResult<()>;

    async fn rollback(&self) -> PortResult<()>;
}

#[async_trait]
pub trait IdentityPort: Send + Sync {
    /// Resolves a bearer credential. Unknown credentials are an error, not
    /// an anonymous identity.
    async fn resolve(&self, credential: &str) -> PortResult<Identity>;
}
