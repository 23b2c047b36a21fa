//! Connections, prepared statements, and row cursors (§4.7, §1.12): the
//! orchestration layer that turns SQL text into a committed (or rolled
//! back) transaction. Grounded on the teacher's own `MVCC`/`Transaction`
//! pairing — a `Database` owns the shared `MVCC` handle the way `MVCC`
//! owns the shared `Arc<Mutex<E>>`, and a `Connection` is to `Database`
//! what a `Transaction` is to `MVCC`.

use crate::catalog::Catalog;
use crate::error::{CResult, Error};
use crate::expr::Parameters;
use crate::mvcc::{MVCCDef, Transaction, MVCC};
use crate::plan::Node;
use crate::planner;
use crate::sql::{self, Bound, CatalogAction, TransactionAction};
use crate::storage::engine::Engine;
use crate::types::Row;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An embedded database: one storage engine, shared by every connection
/// through the same `MVCC` handle (cheap to clone — it's an `Arc` inside).
pub struct Database<E: Engine> {
    mvcc: MVCC<E>,
}

impl<E: Engine> Database<E> {
    pub fn new(engine: E) -> Self {
        Database { mvcc: MVCC::new(engine) }
    }

    pub fn connect(&self) -> Connection<E> {
        Connection { mvcc: self.mvcc.clone(), txn: None }
    }
}

/// Checked at row boundaries during result collection; cooperative, not
/// preemptive (§4.7: cancellation takes effect between rows, not mid-row).
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A session: at most one open transaction at a time. Statements outside
/// an explicit `BEGIN` run as their own auto-committed transaction.
pub struct Connection<E: Engine> {
    mvcc: MVCC<E>,
    txn: Option<Transaction<E>>,
}

/// The result of one executed statement: already fully materialized,
/// since a `Transaction` borrow can't outlive the call that produced it.
pub struct Rows {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Row>,
}

impl Rows {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn next(&mut self) -> Option<Row> {
        self.rows.next()
    }

    pub fn close(self) {}
}

impl Iterator for Rows {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.next()
    }
}

/// A parsed-and-bound statement, reusable across parameter bindings as
/// long as the referenced tables/indexes keep their current definitions.
/// Immutable after `prepare` (§4.7).
pub struct Statement {
    sql: String,
    bound: BoundKind,
}

enum BoundKind {
    Catalog(CatalogAction),
    Transaction(TransactionAction),
    Plan(Node),
}

impl<E: Engine> Connection<E> {
    pub fn prepare(&self, sql: &str) -> CResult<Statement> {
        let parsed = sql::parse(sql)?;
        let catalog = self.catalog_snapshot()?;
        let bound = match sql::bind(parsed, &catalog)? {
            Bound::Catalog(action) => BoundKind::Catalog(action),
            Bound::Transaction(action) => BoundKind::Transaction(action),
            Bound::Plan(node) => BoundKind::Plan(planner::optimize(node, &catalog)),
        };
        Ok(Statement { sql: sql.to_string(), bound })
    }

    pub fn execute(&mut self, sql: &str, parameters: Parameters) -> CResult<Rows> {
        let statement = self.prepare(sql)?;
        self.run(&statement, parameters, &CancellationToken::new())
    }

    pub fn execute_with_cancellation(
        &mut self,
        sql: &str,
        parameters: Parameters,
        cancellation: &CancellationToken,
    ) -> CResult<Rows> {
        let statement = self.prepare(sql)?;
        self.run(&statement, parameters, cancellation)
    }

    pub fn run(&mut self, statement: &Statement, parameters: Parameters, cancellation: &CancellationToken) -> CResult<Rows> {
        match &statement.bound {
            BoundKind::Transaction(action) => self.run_transaction_action(action),
            BoundKind::Catalog(action) => self.run_catalog_action(action),
            BoundKind::Plan(node) => self.run_plan(node, &parameters, cancellation),
        }
    }

    fn run_transaction_action(&mut self, action: &TransactionAction) -> CResult<Rows> {
        match action {
            TransactionAction::Begin { read_only } => {
                if self.txn.is_some() {
                    return Err(Error::Internal("a transaction is already open on this connection".into()));
                }
                let txn = if *read_only { self.mvcc.begin_read_only()? } else { self.mvcc.begin()? };
                self.txn = Some(txn);
            }
            TransactionAction::Commit => {
                let txn = self.txn.take().ok_or(Error::Internal("no transaction is open".into()))?;
                txn.commit()?;
            }
            TransactionAction::Rollback => {
                let txn = self.txn.take().ok_or(Error::Internal("no transaction is open".into()))?;
                txn.rollback()?;
            }
        }
        Ok(Rows { columns: vec![], rows: vec![].into_iter() })
    }

    fn run_catalog_action(&mut self, action: &CatalogAction) -> CResult<Rows> {
        self.with_transaction(|txn| {
            let mut catalog = Catalog::load(txn)?;
            match action {
                CatalogAction::CreateTable { name, columns, sql } => {
                    catalog.create_table(txn, name.clone(), columns.clone(), sql.clone())?;
                }
                CatalogAction::DropTable { name, if_exists } => {
                    match catalog.drop_table(txn, name) {
                        Ok(()) => {}
                        Err(Error::CatalogNotFound(_)) if *if_exists => {}
                        Err(e) => return Err(e),
                    }
                }
                CatalogAction::CreateIndex { name, table, columns, directions, unique, sql } => {
                    catalog.create_index(
                        txn,
                        name.clone(),
                        table.clone(),
                        columns.clone(),
                        directions.clone(),
                        *unique,
                        sql.clone(),
                    )?;
                }
                CatalogAction::DropIndex { name, if_exists } => match catalog.drop_index(txn, name) {
                    Ok(()) => {}
                    Err(Error::CatalogNotFound(_)) if *if_exists => {}
                    Err(e) => return Err(e),
                },
                CatalogAction::CreateSequence { name, start, increment, min, max, cycle, cache } => {
                    catalog.create_sequence(txn, name.clone(), *start, *increment, *min, *max, *cycle, *cache)?;
                }
                CatalogAction::DropSequence { name, if_exists } => match catalog.drop_sequence(txn, name) {
                    Ok(()) => {}
                    Err(Error::CatalogNotFound(_)) if *if_exists => {}
                    Err(e) => return Err(e),
                },
            }
            Ok(Rows { columns: vec![], rows: vec![].into_iter() })
        })
    }

    fn run_plan(&mut self, node: &Node, parameters: &Parameters, cancellation: &CancellationToken) -> CResult<Rows> {
        let columns = node.columns();
        self.with_transaction(|txn| {
            let catalog = Catalog::load(txn)?;
            // `execute` consumes its `Node`, so a prepared `Statement` is
            // replayable across runs only because `Node` is `Clone`.
            let mut rows = Vec::new();
            let mut iter = node.clone().execute(txn, &catalog, parameters)?;
            loop {
                if cancellation.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                match iter.next() {
                    Some(row) => rows.push(row?),
                    None => break,
                }
            }
            Ok(Rows { columns, rows: rows.into_iter() })
        })
    }

    /// Runs `f` against the connection's open transaction, or a fresh
    /// auto-committed one if none is open.
    fn with_transaction<F>(&mut self, f: F) -> CResult<Rows>
    where
        F: FnOnce(&Transaction<E>) -> CResult<Rows>,
    {
        match &self.txn {
            Some(txn) => f(txn),
            None => {
                let txn = self.mvcc.begin()?;
                let result = f(&txn);
                match result {
                    Ok(rows) => {
                        txn.commit()?;
                        Ok(rows)
                    }
                    Err(e) => {
                        txn.rollback()?;
                        Err(e)
                    }
                }
            }
        }
    }

    fn catalog_snapshot(&self) -> CResult<Catalog> {
        match &self.txn {
            Some(txn) => Catalog::load(txn),
            None => {
                let txn = self.mvcc.begin_read_only()?;
                let catalog = Catalog::load(&txn)?;
                txn.rollback().ok();
                Ok(catalog)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::Memory;

    fn connection() -> Connection<Memory> {
        let db = Database::new(Memory::new());
        db.connect()
    }

    #[test]
    fn create_table_insert_and_select_round_trip() -> CResult<()> {
        let mut conn = connection();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", Parameters::None)?;
        conn.execute("INSERT INTO t (id, name) VALUES (1, 'a'), (2, 'b')", Parameters::None)?;
        let mut rows = conn.execute("SELECT id, name FROM t WHERE id > 1", Parameters::None)?;
        let row = rows.next().expect("one row");
        assert_eq!(row.get("name"), Some(&crate::encoding::Value::Text("b".into())));
        assert!(rows.next().is_none());
        Ok(())
    }

    #[test]
    fn wildcard_select_keeps_every_column() -> CResult<()> {
        let mut conn = connection();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", Parameters::None)?;
        conn.execute("INSERT INTO t (id, name) VALUES (1, 'a')", Parameters::None)?;
        let rows = conn.execute("SELECT * FROM t", Parameters::None)?;
        assert_eq!(rows.columns(), &["id".to_string(), "name".to_string()]);
        Ok(())
    }

    #[test]
    fn explicit_transaction_rolls_back_on_request() -> CResult<()> {
        let mut conn = connection();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", Parameters::None)?;
        conn.execute("BEGIN", Parameters::None)?;
        conn.execute("INSERT INTO t (id) VALUES (1)", Parameters::None)?;
        conn.execute("ROLLBACK", Parameters::None)?;
        let mut rows = conn.execute("SELECT id FROM t", Parameters::None)?;
        assert!(rows.next().is_none());
        Ok(())
    }

    #[test]
    fn delete_removes_matching_rows() -> CResult<()> {
        let mut conn = connection();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", Parameters::None)?;
        conn.execute("INSERT INTO t (id) VALUES (1), (2), (3)", Parameters::None)?;
        conn.execute("DELETE FROM t WHERE id = 2", Parameters::None)?;
        let rows: Vec<_> = conn.execute("SELECT id FROM t", Parameters::None)?.collect();
        assert_eq!(rows.len(), 2);
        Ok(())
    }

    #[test]
    fn cancellation_stops_result_collection() -> CResult<()> {
        let mut conn = connection();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", Parameters::None)?;
        conn.execute("INSERT INTO t (id) VALUES (1), (2), (3)", Parameters::None)?;
        let token = CancellationToken::new();
        token.cancel();
        let result = conn.execute_with_cancellation("SELECT id FROM t", Parameters::None, &token);
        assert!(matches!(result, Err(Error::Cancelled)));
        Ok(())
    }

    #[test]
    fn index_is_maintained_on_insert_and_used_by_filter() -> CResult<()> {
        let mut conn = connection();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, b TEXT)", Parameters::None)?;
        conn.execute("CREATE INDEX ix ON t (b)", Parameters::None)?;
        conn.execute(
            "INSERT INTO t (id, b) VALUES (1, 'x'), (2, 'y'), (3, 'x'), (4, 'z')",
            Parameters::None,
        )?;
        let mut rows: Vec<_> = conn.execute("SELECT id FROM t WHERE b = 'x'", Parameters::None)?.collect();
        rows.sort_by_key(|r| r.values.clone());
        assert_eq!(rows.len(), 2);
        Ok(())
    }

    #[test]
    fn index_is_maintained_on_update_and_delete() -> CResult<()> {
        let mut conn = connection();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, b TEXT)", Parameters::None)?;
        conn.execute("CREATE INDEX ix ON t (b)", Parameters::None)?;
        conn.execute("INSERT INTO t (id, b) VALUES (1, 'x'), (2, 'y')", Parameters::None)?;
        conn.execute("UPDATE t SET b = 'y' WHERE id = 1", Parameters::None)?;
        let rows: Vec<_> = conn.execute("SELECT id FROM t WHERE b = 'y'", Parameters::None)?.collect();
        assert_eq!(rows.len(), 2);
        let rows: Vec<_> = conn.execute("SELECT id FROM t WHERE b = 'x'", Parameters::None)?.collect();
        assert!(rows.is_empty());

        conn.execute("DELETE FROM t WHERE id = 1", Parameters::None)?;
        let rows: Vec<_> = conn.execute("SELECT id FROM t WHERE b = 'y'", Parameters::None)?.collect();
        assert_eq!(rows.len(), 1);
        Ok(())
    }

    #[test]
    fn duplicate_primary_key_is_rejected_and_first_row_kept() -> CResult<()> {
        let mut conn = connection();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", Parameters::None)?;
        let err = conn.execute("INSERT INTO t (id) VALUES (1), (1)", Parameters::None).unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
        let rows: Vec<_> = conn.execute("SELECT id FROM t", Parameters::None)?.collect();
        assert_eq!(rows.len(), 1);
        Ok(())
    }

    #[test]
    fn duplicate_unique_index_value_is_rejected() -> CResult<()> {
        let mut conn = connection();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, b TEXT)", Parameters::None)?;
        conn.execute("CREATE UNIQUE INDEX ux ON t (b)", Parameters::None)?;
        conn.execute("INSERT INTO t (id, b) VALUES (1, 'x')", Parameters::None)?;
        let err = conn.execute("INSERT INTO t (id, b) VALUES (2, 'x')", Parameters::None).unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
        Ok(())
    }

    #[test]
    fn column_level_unique_rejects_duplicate_value() -> CResult<()> {
        let mut conn = connection();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, b TEXT UNIQUE)", Parameters::None)?;
        conn.execute("INSERT INTO t (id, b) VALUES (1, 'x')", Parameters::None)?;
        let err = conn.execute("INSERT INTO t (id, b) VALUES (2, 'x')", Parameters::None).unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
        Ok(())
    }

    #[test]
    fn not_null_violation_is_rejected() -> CResult<()> {
        let mut conn = connection();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, b TEXT NOT NULL)", Parameters::None)?;
        let err = conn.execute("INSERT INTO t (id) VALUES (1)", Parameters::None).unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
        Ok(())
    }

    #[test]
    fn default_value_is_substituted_for_missing_column() -> CResult<()> {
        let mut conn = connection();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, b TEXT DEFAULT 'z')", Parameters::None)?;
        conn.execute("INSERT INTO t (id) VALUES (1)", Parameters::None)?;
        let mut rows = conn.execute("SELECT b FROM t WHERE id = 1", Parameters::None)?;
        let row = rows.next().expect("one row");
        assert_eq!(row.get("b"), Some(&crate::encoding::Value::Text("z".into())));
        Ok(())
    }

    #[test]
    fn check_constraint_violation_is_rejected() -> CResult<()> {
        let mut conn = connection();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, age INTEGER CHECK (age > 0))", Parameters::None)?;
        conn.execute("INSERT INTO t (id, age) VALUES (1, 5)", Parameters::None)?;
        let err = conn.execute("INSERT INTO t (id, age) VALUES (2, -1)", Parameters::None).unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
        Ok(())
    }

    #[test]
    fn exclusive_bound_excludes_boundary_on_indexed_column() -> CResult<()> {
        let mut conn = connection();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", Parameters::None)?;
        conn.execute("INSERT INTO t (id) VALUES (1), (2), (3)", Parameters::None)?;
        let rows: Vec<_> = conn.execute("SELECT id FROM t WHERE id > 2", Parameters::None)?.collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&crate::encoding::Value::Integer(3)));
        Ok(())
    }

    #[test]
    fn not_equal_on_indexed_column_excludes_only_that_value() -> CResult<()> {
        let mut conn = connection();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, b TEXT)", Parameters::None)?;
        conn.execute("CREATE INDEX ix ON t (b)", Parameters::None)?;
        conn.execute("INSERT INTO t (id, b) VALUES (1, 'x'), (2, 'y'), (3, 'z')", Parameters::None)?;
        let rows: Vec<_> = conn.execute("SELECT id FROM t WHERE b != 'y'", Parameters::None)?.collect();
        assert_eq!(rows.len(), 2);
        Ok(())
    }
}
