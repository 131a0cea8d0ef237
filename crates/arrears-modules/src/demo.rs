//! Demonstration data for local runs (`--seed-demo`) and tests.

use arrears_protocol::{DatabasePort, PortError, PortResult, Statement};
use serde_json::{Value, json};
use tracing::info;

use crate::events::{EVENTS, REGISTRATIONS};
use crate::members::TABLE as MEMBERS;

fn insert(table: &str, value: Value) -> PortResult<Statement> {
    match value {
        Value::Object(row) => Ok(Statement::insert(table, row)),
        other => Err(PortError::Backend(format!("demo row is not an object: {other}"))),
    }
}

/// Inserts three members, three events, and one registration.
pub async fn seed(database: &dyn DatabasePort) -> PortResult<()> {
    let statements = [
        insert(MEMBERS, json!({ "id": 1, "name": "Ada Lovelace", "email": "ada@example.org", "balance_cents": 0 }))?,
        insert(MEMBERS, json!({ "id": 2, "name": "Grace Hopper", "email": "grace@example.org", "balance_cents": 0 }))?,
        insert(MEMBERS, json!({ "id": 3, "name": "Katherine Johnson", "email": "katherine@example.org", "balance_cents": 0 }))?,
        insert(EVENTS, json!({ "id": 1, "title": "Annual general meeting", "location": "Main hall", "starting": "2024-11-20T18:00:00Z" }))?,
        insert(EVENTS, json!({ "id": 2, "title": "Budgeting workshop", "location": "Room 2", "starting": "2025-02-11T17:30:00Z" }))?,
        insert(EVENTS, json!({ "id": 3, "title": "Board meeting", "location": "Online", "starting": "2025-06-03T19:00:00Z" }))?,
        insert(REGISTRATIONS, json!({ "id": 1, "event_id": 1, "member_id": 1, "registered_at": "2024-11-01T09:00:00Z" }))?,
    ];
    for statement in &statements {
        database.execute(statement).await?;
    }
    info!(rows = statements.len(), "demo data seeded");
    Ok(())
}
