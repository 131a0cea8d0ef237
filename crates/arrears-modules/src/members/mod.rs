//! Members: the people invoices are raised against.

mod contract;
mod handlers;

use arrears_bus::BusResult;
use arrears_kernel::{AppState, Module, SetupContext};
use async_trait::async_trait;
use axum::routing::get;
use axum::{Extension, Router};

pub use contract::{AdjustBalance, GetMember, ListMembers, Member, MembersContract};
pub(crate) use contract::member_schema;

pub(crate) const TABLE: &str = "members";

pub struct MembersModule {
    contract: MembersContract,
}

impl MembersModule {
    pub fn new() -> BusResult<Self> {
        Ok(Self {
            contract: MembersContract::new()?,
        })
    }
}

#[async_trait]
impl Module for MembersModule {
    fn name(&self) -> &str {
        "members"
    }

    async fn setup(&self, context: &mut SetupContext<'_>) -> anyhow::Result<()> {
        context.register(&self.contract.get_member, handlers::get_member)?;
        context.register(&self.contract.list_members, handlers::list_members)?;
        context.register(&self.contract.adjust_balance, handlers::adjust_balance)?;
        Ok(())
    }

    fn routes(&self) -> Router<AppState> {
        Router::new()
            .route("/members", get(handlers::list_route))
            .route("/members/{id}", get(handlers::show_route))
            .layer(Extension(self.contract.clone()))
    }
}
