use arrears_bus::{BusResult, ProcedureDefinition, ProcedureSpec, Scope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub member_id: i64,
    pub amount_cents: i64,
    pub description: String,
    pub issued_at: DateTime<Utc>,
    /// Subject of the staff identity that raised the invoice.
    pub issued_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub member_id: i64,
    pub amount_cents: i64,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ListInvoices {
    pub member_id: i64,
}

#[derive(Debug, Clone)]
pub struct InvoicingContract {
    pub create_invoice: ProcedureDefinition<CreateInvoice, Invoice>,
    pub list_invoices: ProcedureDefinition<ListInvoices, Vec<Invoice>>,
}

fn invoice_schema() -> Value {
    json!({
        "type": "object",
        "required": ["id", "member_id", "amount_cents", "description", "issued_at", "issued_by"],
        "properties": {
            "id": { "type": "integer" },
            "member_id": { "type": "integer" },
            "amount_cents": { "type": "integer", "minimum": 1 },
            "description": { "type": "string" },
            "issued_at": { "type": "string", "format": "date-time" },
            "issued_by": { "type": "string" }
        }
    })
}

impl InvoicingContract {
    pub fn new() -> BusResult<Self> {
        let scope = Scope::new("invoicing")?;
        Ok(Self {
            create_invoice: scope.define_procedure(
                ProcedureSpec::new(
                    "createInvoice",
                    json!({
                        "type": "object",
                        "required": ["member_id", "amount_cents", "description"],
                        "properties": {
                            "member_id": { "type": "integer", "minimum": 1 },
                            "amount_cents": { "type": "integer", "minimum": 1 },
                            "description": { "type": "string", "minLength": 1, "maxLength": 200 }
                        }
                    }),
                    invoice_schema(),
                )
                .description("Raise an invoice and add it to the member's balance"),
            )?,
            list_invoices: scope.define_procedure(ProcedureSpec::new(
                "listInvoices",
                json!({
                    "type": "object",
                    "required": ["member_id"],
                    "properties": { "member_id": { "type": "integer", "minimum": 1 } }
                }),
                json!({ "type": "array", "items": invoice_schema() }),
            ))?,
        })
    }
}
