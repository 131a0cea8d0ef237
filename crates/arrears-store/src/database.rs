use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arrears_protocol::{
    DatabasePort, ExecOutcome, PortError, PortResult, Query, Row, Statement, UnitOfWork,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::filter::{matches_all, sort_rows};
use crate::unit_of_work::MemoryUnitOfWork;

#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    rows: HashMap<String, Vec<Row>>,
    sequences: HashMap<String, i64>,
}

impl Tables {
    /// A scratch copy holding a single table.
    pub(crate) fn single(&self, table: &str) -> Self {
        let mut scratch = Self::default();
        if let Some(rows) = self.rows.get(table) {
            scratch.rows.insert(table.to_owned(), rows.clone());
        }
        scratch
    }

    pub(crate) fn next_id(&mut self, table: &str) -> i64 {
        let sequence = self.sequences.entry(table.to_owned()).or_insert(0);
        *sequence += 1;
        *sequence
    }

    pub(crate) fn select(&self, query: &Query) -> Vec<Row> {
        let mut rows: Vec<Row> = self
            .rows
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_all(row, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some((column, order)) = &query.order_by {
            sort_rows(&mut rows, column, *order);
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        rows
    }

    pub(crate) fn apply(&mut self, statement: &Statement) -> PortResult<ExecOutcome> {
        match statement {
            Statement::Insert { table, row } => {
                let mut row = row.clone();
                let id = match row.get("id") {
                    None | Some(Value::Null) => self.next_id(table),
                    Some(Value::Number(number)) => {
                        let id = number.as_i64().ok_or_else(|| {
                            PortError::Constraint(format!("{table}.id must be an integer"))
                        })?;
                        let taken = self.rows.get(table).is_some_and(|rows| {
                            rows.iter().any(|existing| existing.get("id") == Some(&Value::from(id)))
                        });
                        if taken {
                            return Err(PortError::Constraint(format!(
                                "duplicate primary key {table}.id = {id}"
                            )));
                        }
                        let sequence = self.sequences.entry(table.clone()).or_insert(0);
                        *sequence = (*sequence).max(id);
                        id
                    }
                    Some(_) => {
                        return Err(PortError::Constraint(format!(
                            "{table}.id must be an integer"
                        )));
                    }
                };
                row.insert("id".to_owned(), Value::from(id));
                self.rows.entry(table.clone()).or_default().push(row);
                Ok(ExecOutcome {
                    affected: 1,
                    last_insert_id: Some(id),
                })
            }
            Statement::Update {
                table,
                filters,
                set,
            } => {
                let mut affected = 0;
                for row in self.rows.get_mut(table).into_iter().flatten() {
                    if matches_all(row, filters) {
                        for (column, value) in set {
                            row.insert(column.clone(), value.clone());
                        }
                        affected += 1;
                    }
                }
                Ok(ExecOutcome {
                    affected,
                    last_insert_id: None,
                })
            }
            Statement::Delete { table, filters } => {
                let mut affected = 0;
                if let Some(rows) = self.rows.get_mut(table) {
                    let before = rows.len();
                    rows.retain(|row| !matches_all(row, filters));
                    affected = (before - rows.len()) as u64;
                }
                Ok(ExecOutcome {
                    affected,
                    last_insert_id: None,
                })
            }
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    statements: AtomicU64,
}

/// Process-local database. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts fixture rows directly, bypassing the statement counter.
    /// Non-object values are skipped.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        let mut tables = self.shared.tables.write();
        for value in rows {
            let Value::Object(row) = value else {
                warn!(table, "ignoring non-object seed row");
                continue;
            };
            if let Err(error) = tables.apply(&Statement::insert(table, row)) {
                warn!(table, %error, "seed row rejected");
            }
        }
    }

    /// Every row of `table` in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.shared.tables.read().select(&Query::table(table))
    }

    /// Number of queries and statements issued through the port so far,
    /// including those issued inside units of work.
    pub fn statement_count(&self) -> u64 {
        self.shared.statements.load(Ordering::Relaxed)
    }

    pub(crate) fn record_statement(&self) {
        self.shared.statements.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reserve_id(&self, table: &str) -> i64 {
        self.shared.tables.write().next_id(table)
    }

    pub(crate) fn table_view(&self, table: &str) -> Tables {
        self.shared.tables.read().single(table)
    }

    /// Applies every statement or none of them.
    pub(crate) fn apply_all(&self, statements: &[Statement]) -> PortResult<()> {
        let mut tables = self.shared.tables.write();
        let mut staged = tables.clone();
        for statement in statements {
            staged.apply(statement)?;
        }
        *tables = staged;
        Ok(())
    }
}

#[async_trait]
impl DatabasePort for MemoryDatabase {
    #[instrument(skip(self, query), fields(table = %query.table))]
    async fn query(&self, query: &Query) -> PortResult<Vec<Row>> {
        self.record_statement();
        let rows = self.shared.tables.read().select(query);
        debug!(rows = rows.len(), "query");
        Ok(rows)
    }

    #[instrument(skip(self, statement), fields(table = %statement.table()))]
    async fn execute(&self, statement: &Statement) -> PortResult<ExecOutcome> {
        self.record_statement();
        let outcome = self.shared.tables.write().apply(statement)?;
        debug!(affected = outcome.affected, "statement executed");
        Ok(outcome)
    }

    async fn begin(&self) -> PortResult<Arc<dyn UnitOfWork>> {
        Ok(Arc::new(MemoryUnitOfWork::new(self.clone())))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use arrears_protocol::{Comparison, Order};
    use serde_json::json;

    use super::*;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("fixture rows are objects"),
        }
    }

    #[tokio::test]
    async fn inserts_assign_sequential_ids_per_table() -> Result<()> {
        let db = MemoryDatabase::new();
        let first = db
            .execute(&Statement::insert("members", row(json!({ "name": "Ada" }))))
            .await?;
        let second = db
            .execute(&Statement::insert("members", row(json!({ "name": "Grace" }))))
            .await?;
        let other = db
            .execute(&Statement::insert("events", row(json!({ "title": "AGM" }))))
            .await?;

        assert_eq!(first.last_insert_id, Some(1));
        assert_eq!(second.last_insert_id, Some(2));
        assert_eq!(other.last_insert_id, Some(1));
        assert_eq!(db.rows("members")[1]["name"], json!("Grace"));
        Ok(())
    }

    #[tokio::test]
    async fn explicit_ids_advance_the_sequence_and_reject_duplicates() -> Result<()> {
        let db = MemoryDatabase::new();
        db.seed("members", vec![json!({ "id": 10, "name": "Ada" })]);

        let duplicate = db
            .execute(&Statement::insert("members", row(json!({ "id": 10 }))))
            .await;
        assert!(matches!(duplicate, Err(PortError::Constraint(_))));

        let next = db
            .execute(&Statement::insert("members", row(json!({ "name": "Grace" }))))
            .await?;
        assert_eq!(next.last_insert_id, Some(11));
        Ok(())
    }

    #[tokio::test]
    async fn query_filters_orders_and_limits() -> Result<()> {
        let db = MemoryDatabase::new();
        db.seed(
            "events",
            vec![
                json!({ "title": "Late", "starting": "2024-09-01T18:00:00Z" }),
                json!({ "title": "Early", "starting": "2024-02-01T18:00:00Z" }),
                json!({ "title": "Past", "starting": "2019-02-01T18:00:00Z" }),
            ],
        );

        let rows = db
            .query(
                &Query::table("events")
                    .filter("starting", Comparison::Gte, json!("2024-01-01T00:00:00+00:00"))
                    .order_by("starting", Order::Asc)
                    .limit(5),
            )
            .await?;
        let titles: Vec<_> = rows.iter().map(|row| row["title"].clone()).collect();
        assert_eq!(titles, vec![json!("Early"), json!("Late")]);

        let one = db.query(&Query::table("events").limit(1)).await?;
        assert_eq!(one.len(), 1);
        assert!(db.query(&Query::table("nothing")).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn update_and_delete_report_affected_rows() -> Result<()> {
        let db = MemoryDatabase::new();
        db.seed(
            "members",
            vec![
                json!({ "name": "Ada", "balance_cents": 0 }),
                json!({ "name": "Grace", "balance_cents": 0 }),
            ],
        );

        let updated = db
            .execute(&Statement::update(
                "members",
                Query::table("members").eq("name", "Ada").filters,
                row(json!({ "balance_cents": 500 })),
            ))
            .await?;
        assert_eq!(updated.affected, 1);
        assert_eq!(db.rows("members")[0]["balance_cents"], json!(500));

        let deleted = db.execute(&Statement::delete("members", vec![])).await?;
        assert_eq!(deleted.affected, 2);
        assert!(db.rows("members").is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn statement_count_tracks_port_calls_only() -> Result<()> {
        let db = MemoryDatabase::new();
        db.seed("members", vec![json!({ "name": "Ada" })]);
        assert_eq!(db.statement_count(), 0);

        db.query(&Query::table("members")).await?;
        db.query_one(&Query::table("members")).await?;
        assert_eq!(db.statement_count(), 2);
        Ok(())
    }
}
