//! Cross-module search. Owns no data; everything comes over the bus.

mod handlers;

use arrears_bus::{BusResult, ProcedureDefinition, ProcedureSpec, Scope};
use arrears_kernel::{AppState, Module, SetupContext};
use async_trait::async_trait;
use axum::routing::get;
use axum::{Extension, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::events::{Event, EventsContract, event_schema};
use crate::members::{Member, MembersContract, member_schema};

pub(crate) const DEFAULT_LIMIT: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub term: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
    pub members: Vec<Member>,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone)]
pub struct SearchContract {
    pub search: ProcedureDefinition<SearchQuery, SearchResults>,
}

impl SearchContract {
    pub fn new() -> BusResult<Self> {
        let scope = Scope::new("search")?;
        Ok(Self {
            search: scope.define_procedure(
                ProcedureSpec::new(
                    "search",
                    json!({
                        "type": "object",
                        "required": ["term"],
                        "properties": {
                            "term": { "type": "string", "minLength": 1, "pattern": "\\S" },
                            "limit": { "type": "integer", "minimum": 1, "maximum": 100 }
                        }
                    }),
                    json!({
                        "type": "object",
                        "required": ["members", "events"],
                        "properties": {
                            "members": { "type": "array", "items": member_schema() },
                            "events": { "type": "array", "items": event_schema() }
                        }
                    }),
                )
                .description("Case-insensitive search over member names, emails and event titles"),
            )?,
        })
    }
}

#[derive(Clone)]
pub(crate) struct Dependencies {
    members: MembersContract,
    events: EventsContract,
}

pub struct SearchModule {
    contract: SearchContract,
    dependencies: Dependencies,
}

impl SearchModule {
    pub fn new() -> BusResult<Self> {
        Ok(Self {
            contract: SearchContract::new()?,
            dependencies: Dependencies {
                members: MembersContract::new()?,
                events: EventsContract::new()?,
            },
        })
    }
}

#[async_trait]
impl Module for SearchModule {
    fn name(&self) -> &str {
        "search"
    }

    async fn setup(&self, context: &mut SetupContext<'_>) -> anyhow::Result<()> {
        let dependencies = self.dependencies.clone();
        context.register(&self.contract.search, move |payload, ctx| {
            handlers::search(dependencies.clone(), payload, ctx)
        })?;
        Ok(())
    }

    fn routes(&self) -> Router<AppState> {
        Router::new()
            .route("/search", get(handlers::search_route))
            .layer(Extension(self.contract.clone()))
    }
}
