//! Parameterized query model.
//!
//! Queries and statements name a table and carry their values as bound
//! parameters (`serde_json::Value`). Port implementations translate them to
//! their backend; values are never interpolated into statement text.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single row, keyed by column name.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Case-insensitive substring match on string columns.
    Contains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: Comparison,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub table: String,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<(String, Order)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, column: impl Into<String>, op: Comparison, value: Value) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            op,
            value,
        });
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, Comparison::Eq, value.into())
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order_by = Some((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statement {
    /// Inserts a row. A missing `id` column is assigned by the backend.
    Insert { table: String, row: Row },
    Update {
        table: String,
        filters: Vec<Filter>,
        set: Row,
    },
    Delete { table: String, filters: Vec<Filter> },
}

impl Statement {
    pub fn insert(table: impl Into<String>, row: Row) -> Self {
        Self::Insert {
            table: table.into(),
            row,
        }
    }

    pub fn update(table: impl Into<String>, filters: Vec<Filter>, set: Row) -> Self {
        Self::Update {
            table: table.into(),
            filters,
            set,
        }
    }

    pub fn delete(table: impl Into<String>, filters: Vec<Filter>) -> Self {
        Self::Delete {
            table: table.into(),
            filters,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Self::Insert { table, .. } | Self::Update { table, .. } | Self::Delete { table, .. } => {
                table
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutcome {
    pub affected: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_builder_collects_filters_in_order() {
        let query = Query::table("events")
            .filter("starting", Comparison::Gte, json!("2024-01-01T00:00:00Z"))
            .eq("location", "Hall A")
            .order_by("starting", Order::Asc)
            .limit(10);

        assert_eq!(query.table, "events");
        assert_eq!(query.filters.len(), 2);
        assert_eq!(query.filters[1].op, Comparison::Eq);
        assert_eq!(query.filters[1].value, json!("Hall A"));
        assert_eq!(query.limit, Some(10));
    }

    #[test]
    fn statement_reports_its_table() {
        let statement = Statement::delete("registrations", vec![]);
        assert_eq!(statement.table(), "registrations");
    }
}
