//! Invoicing: raising charges against members.

mod contract;
mod handlers;

use anyhow::Context as _;
use arrears_bus::BusResult;
use arrears_kernel::{AppState, Module, SetupContext};
use async_trait::async_trait;
use axum::routing::get;
use axum::{Extension, Router};
use tracing::info;

pub use contract::{CreateInvoice, Invoice, InvoicingContract, ListInvoices};

use crate::members::{ListMembers, MembersContract};

pub(crate) const TABLE: &str = "invoices";

pub struct InvoicingModule {
    contract: InvoicingContract,
    members: MembersContract,
}

impl InvoicingModule {
    pub fn new() -> BusResult<Self> {
        Ok(Self {
            contract: InvoicingContract::new()?,
            members: MembersContract::new()?,
        })
    }
}

#[async_trait]
impl Module for InvoicingModule {
    fn name(&self) -> &str {
        "invoicing"
    }

    /// Depends on the members module being set up first.
    async fn setup(&self, context: &mut SetupContext<'_>) -> anyhow::Result<()> {
        let members = context
            .exec(&self.members.list_members, ListMembers {})
            .await
            .context("invoicing needs the members module")?;
        info!(members = members.len(), "invoicing sees existing members");

        let for_create = self.members.clone();
        context.register(&self.contract.create_invoice, move |payload, ctx| {
            handlers::create_invoice(for_create.clone(), payload, ctx)
        })?;
        context.register(&self.contract.list_invoices, handlers::list_invoices)?;
        Ok(())
    }

    fn routes(&self) -> Router<AppState> {
        Router::new()
            .route(
                "/members/{id}/invoices",
                get(handlers::list_route).post(handlers::create_route),
            )
            .layer(Extension(self.contract.clone()))
    }
}
