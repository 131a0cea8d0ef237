use arrears_bus::{ExecutionContext, HandlerError};
use arrears_kernel::{ApiResult, RequestContext};
use arrears_protocol::{Order, Query, Role, Statement};
use axum::extract::Path;
use axum::{Extension, Json};
use serde_json::json;
use tracing::info;

use super::TABLE;
use super::contract::{AdjustBalance, GetMember, ListMembers, Member, MembersContract};
use crate::records::{decode, decode_all, row};

async fn find_member(ctx: &ExecutionContext, member_id: i64) -> Result<Member, HandlerError> {
    let found = ctx
        .database()
        .query_one(&Query::table(TABLE).eq("id", member_id))
        .await?
        .ok_or_else(|| HandlerError::NotFound(format!("member {member_id}")))?;
    decode(found)
}

pub(super) async fn get_member(
    payload: GetMember,
    ctx: ExecutionContext,
) -> Result<Member, HandlerError> {
    find_member(&ctx, payload.member_id).await
}

pub(super) async fn list_members(
    _: ListMembers,
    ctx: ExecutionContext,
) -> Result<Vec<Member>, HandlerError> {
    let rows = ctx
        .database()
        .query(&Query::table(TABLE).order_by("name", Order::Asc))
        .await?;
    decode_all(rows)
}

pub(super) async fn adjust_balance(
    payload: AdjustBalance,
    ctx: ExecutionContext,
) -> Result<Member, HandlerError> {
    let actor = ctx.require_role(Role::Staff)?;
    let mut member = find_member(&ctx, payload.member_id).await?;
    member.balance_cents = member
        .balance_cents
        .checked_add(payload.delta_cents)
        .ok_or_else(|| HandlerError::Invalid("balance out of range".to_owned()))?;

    ctx.database()
        .execute(&Statement::update(
            TABLE,
            Query::table(TABLE).eq("id", member.id).filters,
            row(json!({ "balance_cents": member.balance_cents }))?,
        ))
        .await?;
    info!(
        member_id = member.id,
        delta_cents = payload.delta_cents,
        actor = %actor.subject,
        "balance adjusted"
    );
    Ok(member)
}

pub(super) async fn list_route(
    Extension(contract): Extension<MembersContract>,
    context: RequestContext,
) -> ApiResult<Json<Vec<Member>>> {
    Ok(Json(context.exec(&contract.list_members, ListMembers {}).await?))
}

pub(super) async fn show_route(
    Extension(contract): Extension<MembersContract>,
    context: RequestContext,
    Path(member_id): Path<i64>,
) -> ApiResult<Json<Member>> {
    Ok(Json(
        context
            .exec(&contract.get_member, GetMember { member_id })
            .await?,
    ))
}
