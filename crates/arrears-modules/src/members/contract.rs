use arrears_bus::{BusResult, ProcedureDefinition, ProcedureSpec, Scope};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub name: String,
    pub email: String,
    /// Outstanding amount owed, in cents.
    pub balance_cents: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GetMember {
    pub member_id: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ListMembers {}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdjustBalance {
    pub member_id: i64,
    pub delta_cents: i64,
}

/// Procedures published by the members module.
#[derive(Debug, Clone)]
pub struct MembersContract {
    pub get_member: ProcedureDefinition<GetMember, Member>,
    pub list_members: ProcedureDefinition<ListMembers, Vec<Member>>,
    /// Adds `delta_cents` to the member's balance. Staff only.
    pub adjust_balance: ProcedureDefinition<AdjustBalance, Member>,
}

pub(crate) fn member_schema() -> Value {
    json!({
        "type": "object",
        "required": ["id", "name", "email", "balance_cents"],
        "properties": {
            "id": { "type": "integer" },
            "name": { "type": "string" },
            "email": { "type": "string" },
            "balance_cents": { "type": "integer" }
        }
    })
}

fn member_id_payload() -> Value {
    json!({
        "type": "object",
        "required": ["member_id"],
        "properties": { "member_id": { "type": "integer", "minimum": 1 } }
    })
}

impl MembersContract {
    pub fn new() -> BusResult<Self> {
        let scope = Scope::new("members")?;
        Ok(Self {
            get_member: scope.define_procedure(
                ProcedureSpec::new("getMember", member_id_payload(), member_schema())
                    .description("Fetch one member by id"),
            )?,
            list_members: scope.define_procedure(
                ProcedureSpec::new(
                    "listMembers",
                    json!({ "type": "object", "additionalProperties": false }),
                    json!({ "type": "array", "items": member_schema() }),
                )
                .description("Every member, ordered by name"),
            )?,
            adjust_balance: scope.define_procedure(ProcedureSpec::new(
                "adjustBalance",
                json!({
                    "type": "object",
                    "required": ["member_id", "delta_cents"],
                    "properties": {
                        "member_id": { "type": "integer", "minimum": 1 },
                        "delta_cents": { "type": "integer" }
                    }
                }),
                member_schema(),
            ))?,
        })
    }
}
