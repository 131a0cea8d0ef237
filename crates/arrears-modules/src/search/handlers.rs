use arrears_bus::{ExecutionContext, HandlerError};
use arrears_kernel::{ApiResult, RequestContext};
use axum::extract::Query;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use futures_util::future::try_join;
use serde::Deserialize;
use tracing::debug;

use super::{DEFAULT_LIMIT, Dependencies, SearchContract, SearchQuery, SearchResults};
use crate::events::GetEvents;
use crate::members::ListMembers;

fn matches(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

pub(super) async fn search(
    dependencies: Dependencies,
    payload: SearchQuery,
    ctx: ExecutionContext,
) -> Result<SearchResults, HandlerError> {
    let needle = payload.term.trim().to_lowercase();
    if needle.is_empty() {
        return Err(HandlerError::Invalid("search term is blank".to_owned()));
    }
    let limit = payload.limit.unwrap_or(DEFAULT_LIMIT);

    let (members, events) = try_join(
        ctx.exec(&dependencies.members.list_members, ListMembers {}),
        ctx.exec(
            &dependencies.events.get_events,
            GetEvents {
                starting: DateTime::<Utc>::UNIX_EPOCH,
            },
        ),
    )
    .await?;

    let members: Vec<_> = members
        .into_iter()
        .filter(|member| matches(&member.name, &needle) || matches(&member.email, &needle))
        .take(limit)
        .collect();
    let events: Vec<_> = events
        .into_iter()
        .filter(|event| {
            matches(&event.title, &needle)
                || event
                    .location
                    .as_deref()
                    .is_some_and(|location| matches(location, &needle))
        })
        .take(limit)
        .collect();
    debug!(
        members = members.len(),
        events = events.len(),
        "search completed"
    );

    Ok(SearchResults { members, events })
}

#[derive(Debug, Deserialize)]
pub(super) struct SearchParams {
    q: String,
    limit: Option<usize>,
}

pub(super) async fn search_route(
    Extension(contract): Extension<SearchContract>,
    context: RequestContext,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<SearchResults>> {
    Ok(Json(
        context
            .exec(
                &contract.search,
                SearchQuery {
                    term: params.q,
                    limit: params.limit,
                },
            )
            .await?,
    ))
}
