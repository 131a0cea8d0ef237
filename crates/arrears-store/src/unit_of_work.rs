use std::sync::Arc;

use arrears_protocol::{
    DatabasePort, ExecOutcome, PortError, PortResult, Query, Row, Statement, UnitOfWork,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::database::{MemoryDatabase, Tables};

#[derive(Debug, Default)]
struct UnitState {
    pending: Vec<Statement>,
    completed: bool,
}

#[derive(Debug)]
struct UnitInner {
    database: MemoryDatabase,
    state: Mutex<UnitState>,
}

impl UnitInner {
    /// The committed table with this unit's pending statements applied.
    fn view(&self, state: &UnitState, table: &str) -> PortResult<Tables> {
        let mut view = self.database.table_view(table);
        for statement in state.pending.iter().filter(|s| s.table() == table) {
            view.apply(statement)?;
        }
        Ok(view)
    }
}

/// A buffered unit of work over a [`MemoryDatabase`].
///
/// Statements issued through [`UnitOfWork::database`] are buffered; reads
/// through the same handle see them. Nothing reaches the shared tables until
/// `commit`. Inserts without an `id` reserve one immediately so callers get
/// `last_insert_id` back; rolled-back reservations leave gaps.
#[derive(Debug)]
pub struct MemoryUnitOfWork {
    inner: Arc<UnitInner>,
}

impl MemoryUnitOfWork {
    pub(crate) fn new(database: MemoryDatabase) -> Self {
        Self {
            inner: Arc::new(UnitInner {
                database,
                state: Mutex::new(UnitState::default()),
            }),
        }
    }

    pub fn pending_statements(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn is_completed(&self) -> bool {
        self.inner.state.lock().completed
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    fn database(&self) -> Arc<dyn DatabasePort> {
        Arc::new(UnitDatabase {
            inner: self.inner.clone(),
        })
    }

    #[instrument(skip(self))]
    async fn commit(&self) -> PortResult<()> {
        let mut state = self.inner.state.lock();
        if state.completed {
            return Err(PortError::TransactionClosed);
        }
        state.completed = true;
        let pending = std::mem::take(&mut state.pending);
        self.inner.database.apply_all(&pending)?;
        debug!(statements = pending.len(), "unit of work committed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn rollback(&self) -> PortResult<()> {
        let mut state = self.inner.state.lock();
        if state.completed {
            return Err(PortError::TransactionClosed);
        }
        state.completed = true;
        let discarded = std::mem::take(&mut state.pending).len();
        debug!(discarded, "unit of work rolled back");
        Ok(())
    }
}

struct UnitDatabase {
    inner: Arc<UnitInner>,
}

#[async_trait]
impl DatabasePort for UnitDatabase {
    #[instrument(skip(self, query), fields(table = %query.table))]
    async fn query(&self, query: &Query) -> PortResult<Vec<Row>> {
        self.inner.database.record_statement();
        let state = self.inner.state.lock();
        if state.completed {
            return Err(PortError::TransactionClosed);
        }
        Ok(self.inner.view(&state, &query.table)?.select(query))
    }

    #[instrument(skip(self, statement), fields(table = %statement.table()))]
    async fn execute(&self, statement: &Statement) -> PortResult<ExecOutcome> {
        self.inner.database.record_statement();
        let mut state = self.inner.state.lock();
        if state.completed {
            return Err(PortError::TransactionClosed);
        }

        let mut statement = statement.clone();
        if let Statement::Insert { table, row } = &mut statement
            && matches!(row.get("id"), None | Some(Value::Null))
        {
            let id = self.inner.database.reserve_id(table);
            row.insert("id".to_owned(), Value::from(id));
        }

        let outcome = self
            .inner
            .view(&state, statement.table())?
            .apply(&statement)?;
        state.pending.push(statement);
        Ok(outcome)
    }

    async fn begin(&self) -> PortResult<Arc<dyn UnitOfWork>> {
        Err(PortError::NestedTransaction)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use serde_json::json;

    use super::*;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("fixture rows are objects"),
        }
    }

    #[tokio::test]
    async fn writes_are_visible_inside_but_not_outside_until_commit() -> Result<()> {
        let db = MemoryDatabase::new();
        db.seed("members", vec![json!({ "name": "Ada", "balance_cents": 0 })]);

        let unit = db.begin().await?;
        let scoped = unit.database();
        let inserted = scoped
            .execute(&Statement::insert("members", row(json!({ "name": "Grace" }))))
            .await?;
        assert_eq!(inserted.last_insert_id, Some(2));
        scoped
            .execute(&Statement::update(
                "members",
                Query::table("members").eq("id", 1).filters,
                row(json!({ "balance_cents": 250 })),
            ))
            .await?;

        let inside = scoped.query(&Query::table("members")).await?;
        assert_eq!(inside.len(), 2);
        assert_eq!(inside[0]["balance_cents"], json!(250));
        assert_eq!(db.rows("members").len(), 1);
        assert_eq!(db.rows("members")[0]["balance_cents"], json!(0));

        unit.commit().await?;
        let committed = db.rows("members");
        assert_eq!(committed.len(), 2);
        assert_eq!(committed[0]["balance_cents"], json!(250));
        assert_eq!(committed[1]["id"], json!(2));
        Ok(())
    }

    #[tokio::test]
    async fn rollback_discards_pending_statements() -> Result<()> {
        let db = MemoryDatabase::new();
        let unit = db.begin().await?;
        unit.database()
            .execute(&Statement::insert("invoices", row(json!({ "amount_cents": 100 }))))
            .await?;
        unit.rollback().await?;

        assert!(db.rows("invoices").is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn completed_unit_rejects_further_use() -> Result<()> {
        let db = MemoryDatabase::new();
        let unit = db.begin().await?;
        let scoped = unit.database();
        unit.commit().await?;

        assert_eq!(unit.commit().await, Err(PortError::TransactionClosed));
        assert_eq!(unit.rollback().await, Err(PortError::TransactionClosed));
        assert_eq!(
            scoped.query(&Query::table("members")).await,
            Err(PortError::TransactionClosed)
        );
        Ok(())
    }

    #[tokio::test]
    async fn nested_begin_is_rejected() -> Result<()> {
        let db = MemoryDatabase::new();
        let unit = db.begin().await?;
        let nested = unit.database().begin().await;
        assert!(matches!(nested, Err(PortError::NestedTransaction)));
        Ok(())
    }

    #[tokio::test]
    async fn failed_statement_is_not_buffered() -> Result<()> {
        let db = MemoryDatabase::new();
        db.seed("members", vec![json!({ "id": 1, "name": "Ada" })]);
        let unit = MemoryUnitOfWork::new(db.clone());
        let scoped = unit.database();

        let duplicate = scoped
            .execute(&Statement::insert("members", row(json!({ "id": 1 }))))
            .await;
        assert!(matches!(duplicate, Err(PortError::Constraint(_))));
        assert_eq!(unit.pending_statements(), 0);

        unit.commit().await?;
        assert!(unit.is_completed());
        assert_eq!(db.rows("members").len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn independent_units_do_not_see_each_other() -> Result<()> {
        let db = MemoryDatabase::new();
        let first = db.begin().await?;
        let second = db.begin().await?;

        first
            .database()
            .execute(&Statement::insert("events", row(json!({ "title": "AGM" }))))
            .await?;
        let seen = second.database().query(&Query::table("events")).await?;
        assert!(seen.is_empty());

        first.commit().await?;
        second.rollback().await?;
        assert_eq!(db.rows("events").len(), 1);
        Ok(())
    }
}
