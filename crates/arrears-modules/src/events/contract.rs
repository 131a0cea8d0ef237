use arrears_bus::{BusResult, ProcedureDefinition, ProcedureSpec, Scope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub starting: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: i64,
    pub event_id: i64,
    pub member_id: i64,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GetEvents {
    /// Lower bound (inclusive) on the event start.
    pub starting: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GetEventRegistrations {
    pub event_id: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegisterMember {
    pub event_id: i64,
    pub member_id: i64,
}

#[derive(Debug, Clone)]
pub struct EventsContract {
    pub get_events: ProcedureDefinition<GetEvents, Vec<Event>>,
    pub get_event_registrations: ProcedureDefinition<GetEventRegistrations, Vec<Registration>>,
    pub register_member: ProcedureDefinition<RegisterMember, Registration>,
}

pub(crate) fn event_schema() -> Value {
    json!({
        "type": "object",
        "required": ["id", "title", "starting"],
        "properties": {
            "id": { "type": "integer" },
            "title": { "type": "string" },
            "location": { "type": "string" },
            "starting": { "type": "string", "format": "date-time" }
        }
    })
}

fn registration_schema() -> Value {
    json!({
        "type": "object",
        "required": ["id", "event_id", "member_id", "registered_at"],
        "properties": {
            "id": { "type": "integer" },
            "event_id": { "type": "integer" },
            "member_id": { "type": "integer" },
            "registered_at": { "type": "string", "format": "date-time" }
        }
    })
}

impl EventsContract {
    pub fn new() -> BusResult<Self> {
        let scope = Scope::new("events")?;
        Ok(Self {
            get_events: scope.define_procedure(
                ProcedureSpec::new(
                    "getEvents",
                    json!({
                        "type": "object",
                        "required": ["starting"],
                        "properties": {
                            "starting": { "type": "string", "format": "date-time" }
                        }
                    }),
                    json!({ "type": "array", "items": event_schema() }),
                )
                .description("Events starting at or after `starting`, earliest first"),
            )?,
            get_event_registrations: scope.define_procedure(ProcedureSpec::new(
                "getEventRegistrations",
                json!({
                    "type": "object",
                    "required": ["event_id"],
                    "properties": { "event_id": { "type": "integer" } }
                }),
                json!({ "type": "array", "items": registration_schema() }),
            ))?,
            register_member: scope.define_procedure(
                ProcedureSpec::new(
                    "registerMember",
                    json!({
                        "type": "object",
                        "required": ["event_id", "member_id"],
                        "properties": {
                            "event_id": { "type": "integer" },
                            "member_id": { "type": "integer" }
                        }
                    }),
                    registration_schema(),
                )
                .description("Register an existing member for an event"),
            )?,
        })
    }
}
