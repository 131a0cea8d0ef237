use arrears_bus::{ExecutionContext, HandlerError};
use arrears_kernel::{ApiResult, RequestContext};
use arrears_protocol::{Comparison, Order, Query, Statement};
use axum::extract::{self, Path};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::contract::{
    Event, EventsContract, GetEventRegistrations, GetEvents, RegisterMember, Registration,
};
use super::{EVENTS, REGISTRATIONS};
use crate::members::{GetMember, MembersContract};
use crate::records::{decode, decode_all, row};

pub(super) async fn get_events(
    payload: GetEvents,
    ctx: ExecutionContext,
) -> Result<Vec<Event>, HandlerError> {
    let rows = ctx
        .database()
        .query(
            &Query::table(EVENTS)
                .filter("starting", Comparison::Gte, json!(payload.starting))
                .order_by("starting", Order::Asc),
        )
        .await?;
    decode_all(rows)
}

pub(super) async fn get_event_registrations(
    payload: GetEventRegistrations,
    ctx: ExecutionContext,
) -> Result<Vec<Registration>, HandlerError> {
    debug!(event_id = payload.event_id, "loading registrations");
    let rows = ctx
        .database()
        .query(
            &Query::table(REGISTRATIONS)
                .eq("event_id", payload.event_id)
                .order_by("id", Order::Asc),
        )
        .await?;
    decode_all(rows)
}

pub(super) async fn register_member(
    members: MembersContract,
    payload: RegisterMember,
    ctx: ExecutionContext,
) -> Result<Registration, HandlerError> {
    ctx.require_identity()?;
    let event: Event = ctx
        .database()
        .query_one(&Query::table(EVENTS).eq("id", payload.event_id))
        .await?
        .ok_or_else(|| HandlerError::NotFound(format!("event {}", payload.event_id)))
        .and_then(decode)?;
    let member = ctx
        .exec(
            &members.get_member,
            GetMember {
                member_id: payload.member_id,
            },
        )
        .await?;

    let existing = ctx
        .database()
        .query_one(
            &Query::table(REGISTRATIONS)
                .eq("event_id", event.id)
                .eq("member_id", member.id),
        )
        .await?;
    if existing.is_some() {
        return Err(HandlerError::Conflict(format!(
            "member {} is already registered for event {}",
            member.id, event.id
        )));
    }

    let registered_at = Utc::now();
    let outcome = ctx
        .database()
        .execute(&Statement::insert(
            REGISTRATIONS,
            row(json!({
                "event_id": event.id,
                "member_id": member.id,
                "registered_at": registered_at,
            }))?,
        ))
        .await?;
    let id = outcome
        .last_insert_id
        .ok_or_else(|| HandlerError::Internal("insert returned no id".to_owned()))?;
    info!(event_id = event.id, member_id = member.id, "member registered");

    Ok(Registration {
        id,
        event_id: event.id,
        member_id: member.id,
        registered_at,
    })
}

#[derive(Debug, Deserialize)]
pub(super) struct EventsQuery {
    starting: Option<DateTime<Utc>>,
}

pub(super) async fn list_route(
    Extension(contract): Extension<EventsContract>,
    context: RequestContext,
    extract::Query(query): extract::Query<EventsQuery>,
) -> ApiResult<Json<Vec<Event>>> {
    let starting = query.starting.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    Ok(Json(
        context
            .exec(&contract.get_events, GetEvents { starting })
            .await?,
    ))
}

pub(super) async fn registrations_route(
    Extension(contract): Extension<EventsContract>,
    context: RequestContext,
    Path(event_id): Path<i64>,
) -> ApiResult<Json<Vec<Registration>>> {
    Ok(Json(
        context
            .exec(
                &contract.get_event_registrations,
                GetEventRegistrations { event_id },
            )
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub(super) struct RegisterBody {
    member_id: i64,
}

pub(super) async fn register_route(
    Extension(contract): Extension<EventsContract>,
    context: RequestContext,
    Path(event_id): Path<i64>,
    Json(body): Json<RegisterBody>,
) -> ApiResult<(StatusCode, Json<Registration>)> {
    let registration = context
        .exec(
            &contract.register_member,
            RegisterMember {
                event_id,
                member_id: body.member_id,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use arrears_bus::BusError;
    use arrears_kernel::ApiError;
    use arrears_protocol::{Identity, Role};

    use super::*;
    use crate::testing::kernel_with_demo_data;

    #[tokio::test]
    async fn get_events_from_epoch_returns_every_event() -> Result<()> {
        let (kernel, db) = kernel_with_demo_data().await?;
        let contract = EventsContract::new()?;

        let events = kernel
            .context(None)
            .exec(
                &contract.get_events,
                GetEvents {
                    starting: DateTime::<Utc>::UNIX_EPOCH,
                },
            )
            .await?;

        assert_eq!(events.len(), db.rows(EVENTS).len());
        assert!(events.windows(2).all(|pair| pair[0].starting <= pair[1].starting));
        Ok(())
    }

    #[tokio::test]
    async fn get_events_excludes_events_before_starting() -> Result<()> {
        let (kernel, _db) = kernel_with_demo_data().await?;
        let contract = EventsContract::new()?;
        let cutoff: DateTime<Utc> = "2025-01-01T00:00:00Z".parse()?;

        let events = kernel
            .context(None)
            .exec(&contract.get_events, GetEvents { starting: cutoff })
            .await?;
        assert!(!events.is_empty());
        assert!(events.iter().all(|event| event.starting >= cutoff));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_registration_lookup_never_touches_the_database() -> Result<()> {
        let (kernel, db) = kernel_with_demo_data().await?;
        let contract = EventsContract::new()?;
        let ctx = kernel.context(None);
        let before = db.statement_count();

        for payload in [json!(42), json!({ "event_id": "42" }), json!({ "event_id": 1.0 })] {
            let error = ctx
                .exec_value(&contract.get_event_registrations, payload)
                .await
                .expect_err("shape mismatch");
            assert!(matches!(error, BusError::InvalidPayload { .. }));
            assert_eq!(ApiError::from(error).status(), StatusCode::BAD_REQUEST);
        }
        assert_eq!(db.statement_count(), before);

        let registrations = ctx
            .exec(&contract.get_event_registrations, GetEventRegistrations { event_id: 1 })
            .await?;
        assert_eq!(registrations.len(), 1);
        assert_eq!(db.statement_count(), before + 1);
        Ok(())
    }

    #[tokio::test]
    async fn non_timestamp_starting_is_rejected_by_the_contract() -> Result<()> {
        let (kernel, _db) = kernel_with_demo_data().await?;
        let contract = EventsContract::new()?;

        let error = kernel
            .context(None)
            .exec_value(&contract.get_events, json!({ "starting": "next tuesday" }))
            .await
            .expect_err("format is enforced");
        match error {
            BusError::InvalidPayload { violations, .. } => {
                assert_eq!(violations[0].path, "/starting");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn register_member_checks_member_and_rejects_duplicates() -> Result<()> {
        let (kernel, db) = kernel_with_demo_data().await?;
        let contract = EventsContract::new()?;
        let ctx = kernel.context(Some(Identity::new("grace", vec![Role::Member])));

        let registration = ctx
            .exec(
                &contract.register_member,
                RegisterMember {
                    event_id: 2,
                    member_id: 2,
                },
            )
            .await?;
        assert_eq!(registration.event_id, 2);
        assert_eq!(db.rows(REGISTRATIONS).len(), 2);

        let duplicate = ctx
            .exec(
                &contract.register_member,
                RegisterMember {
                    event_id: 2,
                    member_id: 2,
                },
            )
            .await
            .expect_err("second registration conflicts");
        assert!(matches!(
            duplicate,
            BusError::Handler { source: HandlerError::Conflict(_), .. }
        ));

        let unknown = ctx
            .exec(
                &contract.register_member,
                RegisterMember {
                    event_id: 2,
                    member_id: 99,
                },
            )
            .await
            .expect_err("member must exist");
        assert!(matches!(
            unknown.root_cause(),
            BusError::Handler { procedure, source: HandlerError::NotFound(_) }
                if procedure == "members:getMember"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn anonymous_callers_cannot_register() -> Result<()> {
        let (kernel, _db) = kernel_with_demo_data().await?;
        let contract = EventsContract::new()?;

        let error = kernel
            .context(None)
            .exec_value(
                &contract.register_member,
                json!({ "event_id": 1, "member_id": 1 }),
            )
            .await
            .expect_err("identity required");
        assert!(matches!(
            error,
            BusError::Handler { source: HandlerError::Unauthenticated(_), .. }
        ));
        Ok(())
    }
}
