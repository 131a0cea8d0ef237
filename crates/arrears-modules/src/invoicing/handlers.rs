use arrears_bus::{ExecutionContext, HandlerError};
use arrears_kernel::{ApiResult, RequestContext};
use arrears_protocol::{Order, Query, Role, Statement};
use axum::extract::Path;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::TABLE;
use super::contract::{CreateInvoice, Invoice, InvoicingContract, ListInvoices};
use crate::members::{AdjustBalance, MembersContract};
use crate::records::{decode_all, row};

pub(super) async fn create_invoice(
    members: MembersContract,
    payload: CreateInvoice,
    ctx: ExecutionContext,
) -> Result<Invoice, HandlerError> {
    let issued_by = ctx.require_role(Role::Staff)?.subject.clone();
    let member = ctx
        .exec(
            &members.adjust_balance,
            AdjustBalance {
                member_id: payload.member_id,
                delta_cents: payload.amount_cents,
            },
        )
        .await?;

    let issued_at = Utc::now();
    let outcome = ctx
        .database()
        .execute(&Statement::insert(
            TABLE,
            row(json!({
                "member_id": member.id,
                "amount_cents": payload.amount_cents,
                "description": payload.description,
                "issued_at": issued_at,
                "issued_by": issued_by,
            }))?,
        ))
        .await?;
    let id = outcome
        .last_insert_id
        .ok_or_else(|| HandlerError::Internal("insert returned no id".to_owned()))?;
    info!(
        invoice_id = id,
        member_id = member.id,
        amount_cents = payload.amount_cents,
        balance_cents = member.balance_cents,
        "invoice created"
    );

    Ok(Invoice {
        id,
        member_id: member.id,
        amount_cents: payload.amount_cents,
        description: payload.description,
        issued_at,
        issued_by,
    })
}

pub(super) async fn list_invoices(
    payload: ListInvoices,
    ctx: ExecutionContext,
) -> Result<Vec<Invoice>, HandlerError> {
    ctx.require_identity()?;
    let rows = ctx
        .database()
        .query(
            &Query::table(TABLE)
                .eq("member_id", payload.member_id)
                .order_by("issued_at", Order::Desc),
        )
        .await?;
    decode_all(rows)
}

pub(super) async fn list_route(
    Extension(contract): Extension<InvoicingContract>,
    context: RequestContext,
    Path(member_id): Path<i64>,
) -> ApiResult<Json<Vec<Invoice>>> {
    Ok(Json(
        context
            .exec(&contract.list_invoices, ListInvoices { member_id })
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateBody {
    amount_cents: i64,
    description: String,
}

pub(super) async fn create_route(
    Extension(contract): Extension<InvoicingContract>,
    context: RequestContext,
    Path(member_id): Path<i64>,
    Json(body): Json<CreateBody>,
) -> ApiResult<(StatusCode, Json<Invoice>)> {
    let invoice = context
        .exec(
            &contract.create_invoice,
            CreateInvoice {
                member_id,
                amount_cents: body.amount_cents,
                description: body.description,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}
