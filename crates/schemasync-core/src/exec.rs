//! Statement execution shared by every synchronizer.
//!
//! All SQL issued by the layer goes through [`Executor`] so that the number of
//! statements and the engine's last error message stay observable.
//!
//! Statement handles are `rusqlite` statements: a `Rows` cursor mutably
//! borrows its statement, so a pending result is always finalized (reset)
//! before the same handle can be rebound and stepped again.

use crate::{Result, SyncError};
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::{CachedStatement, Connection, OptionalExtension, Params, Row, Statement, ToSql};
use std::cell::{Cell, RefCell};
use std::panic::UnwindSafe;

/// Owner of the connection; counts statements and keeps the last error.
pub struct Executor {
    conn: Connection,
    executed: Cell<u64>,
    last_error: RefCell<Option<String>>,
}

impl Executor {
    pub(crate) fn new(conn: Connection) -> Self {
        Self {
            conn,
            executed: Cell::new(0),
            last_error: RefCell::new(None),
        }
    }

    /// The underlying connection, for callers that read and write rows.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Number of statements executed through this executor.
    pub fn executed_statements(&self) -> u64 {
        self.executed.get()
    }

    /// Text of the most recent engine error, if any statement failed.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    /// Remember `err` as the last engine error and convert it.
    pub(crate) fn record(&self, err: rusqlite::Error) -> SyncError {
        *self.last_error.borrow_mut() = Some(err.to_string());
        err.into()
    }

    fn tick(&self) {
        self.executed.set(self.executed.get() + 1);
    }

    pub(crate) fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        self.tick();
        self.conn.execute(sql, params).map_err(|e| self.record(e))
    }

    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.tick();
        self.conn.execute_batch(sql).map_err(|e| self.record(e))
    }

    pub(crate) fn query_row<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<T>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.tick();
        self.conn
            .query_row(sql, params, f)
            .map_err(|e| self.record(e))
    }

    pub(crate) fn query_row_optional<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Option<T>>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.tick();
        self.conn
            .query_row(sql, params, f)
            .optional()
            .map_err(|e| self.record(e))
    }

    /// Run a query through the statement cache and collect every mapped row.
    pub(crate) fn query_collect<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.prepare_cached(sql)?;
        let rows = stmt.query_map(params, f).map_err(|e| self.record(e))?;
        rows.collect::<rusqlite::Result<Vec<T>>>()
            .map_err(|e| self.record(e))
    }

    /// Prepare (or reuse) a cached statement. Counts as one execution.
    pub(crate) fn prepare_cached(&self, sql: &str) -> Result<CachedStatement<'_>> {
        self.tick();
        self.conn.prepare_cached(sql).map_err(|e| self.record(e))
    }

    /// Prepare a one-off statement, e.g. one whose SQL names a table that is
    /// about to be rebuilt.
    pub(crate) fn prepare(&self, sql: &str) -> Result<Statement<'_>> {
        self.tick();
        self.conn.prepare(sql).map_err(|e| self.record(e))
    }

    /// Register a deterministic scalar SQL function taking `n_args` arguments.
    pub fn register_scalar<F, T>(&self, name: &str, n_args: i32, f: F) -> Result<()>
    where
        F: FnMut(&Context<'_>) -> rusqlite::Result<T> + Send + UnwindSafe + 'static,
        T: ToSql,
    {
        self.conn
            .create_scalar_function(
                name,
                n_args,
                FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
                f,
            )
            .map_err(|e| self.record(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> Executor {
        Executor::new(Connection::open_in_memory().unwrap())
    }

    #[test]
    fn test_counts_statements() {
        let exec = executor();
        exec.execute_batch("CREATE TABLE t (a INTEGER)").unwrap();
        exec.execute("INSERT INTO t (a) VALUES (?1)", [7]).unwrap();
        let a: i64 = exec.query_row("SELECT a FROM t", [], |row| row.get(0)).unwrap();
        assert_eq!(a, 7);
        assert_eq!(exec.executed_statements(), 3);
    }

    #[test]
    fn test_records_last_error() {
        let exec = executor();
        assert!(exec.last_error().is_none());
        assert!(exec.execute_batch("CREATE TABLE (").is_err());
        assert!(exec.last_error().unwrap().contains("syntax error"));
    }

    #[test]
    fn test_cached_statement_reused_after_cursor_drop() {
        let exec = executor();
        exec.execute_batch("CREATE TABLE t (a INTEGER); INSERT INTO t VALUES (1), (2);")
            .unwrap();
        for _ in 0..2 {
            let values = exec
                .query_collect("SELECT a FROM t ORDER BY a", [], |row| row.get::<_, i64>(0))
                .unwrap();
            assert_eq!(values, vec![1, 2]);
        }
    }

    #[test]
    fn test_register_scalar() {
        let exec = executor();
        exec.register_scalar("twice", 1, |ctx| Ok(ctx.get::<i64>(0)? * 2))
            .unwrap();
        let v: i64 = exec.query_row("SELECT twice(21)", [], |row| row.get(0)).unwrap();
        assert_eq!(v, 42);
    }
}
