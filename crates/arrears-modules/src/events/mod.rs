//! Events members can register for.

mod contract;
mod handlers;

use arrears_bus::BusResult;
use arrears_kernel::{AppState, Module, SetupContext};
use async_trait::async_trait;
use axum::routing::get;
use axum::{Extension, Router};

pub use contract::{
    Event, EventsContract, GetEventRegistrations, GetEvents, RegisterMember, Registration,
};
pub(crate) use contract::event_schema;

use crate::members::MembersContract;

pub(crate) const EVENTS: &str = "events";
pub(crate) const REGISTRATIONS: &str = "registrations";

pub struct EventsModule {
    contract: EventsContract,
    members: MembersContract,
}

impl EventsModule {
    pub fn new() -> BusResult<Self> {
        Ok(Self {
            contract: EventsContract::new()?,
            members: MembersContract::new()?,
        })
    }
}

#[async_trait]
impl Module for EventsModule {
    fn name(&self) -> &str {
        "events"
    }

    async fn setup(&self, context: &mut SetupContext<'_>) -> anyhow::Result<()> {
        context.register(&self.contract.get_events, handlers::get_events)?;
        context.register(
            &self.contract.get_event_registrations,
            handlers::get_event_registrations,
        )?;
        let members = self.members.clone();
        context.register(&self.contract.register_member, move |payload, ctx| {
            handlers::register_member(members.clone(), payload, ctx)
        })?;
        Ok(())
    }

    fn routes(&self) -> Router<AppState> {
        Router::new()
            .route("/events", get(handlers::list_route))
            .route(
                "/events/{id}/registrations",
                get(handlers::registrations_route).post(handlers::register_route),
            )
            .layer(Extension(self.contract.clone()))
    }
}
