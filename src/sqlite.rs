//! SQLite backend (feature `sqlite`).
//!
//! [`SqliteConnector`] opens a `rusqlite::Connection` for a file path and
//! closes it on release. The helpers turn rows into [`Rows`] and run a closure
//! inside a transaction.
//!
//! ```rust
//! use querywell::sqlite::{query_args, SqliteConnector};
//! use querywell::{Args, QueryPipeline, RetryPolicy};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("users.db");
//! let setup = rusqlite::Connection::open(&path).unwrap();
//! setup.execute_batch("CREATE TABLE users (name TEXT); INSERT INTO users VALUES ('alice');").unwrap();
//! drop(setup);
//!
//! let users = QueryPipeline::new(SqliteConnector, path.to_string_lossy(), query_args)
//!     .with_retry(RetryPolicy::once());
//!
//! let rows = users.call(&Args::query("SELECT name FROM users")).unwrap();
//! assert_eq!(rows[0][0].as_text(), Some("alice"));
//! ```

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{ffi, params_from_iter, Connection, ErrorCode, ToSql, Transaction};

use crate::key::Args;
use crate::scope::Connector;
use crate::value::{Row, Rows, Value};

/// Opens SQLite database files.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl Connector for SqliteConnector {
    type Handle = Connection;
    type Error = rusqlite::Error;

    fn connect(&self, location: &str) -> Result<Connection, rusqlite::Error> {
        Connection::open(location)
    }

    fn release(&self, handle: Connection) -> Result<(), rusqlite::Error> {
        handle.close().map_err(|(_, e)| e)
    }
}

/// Run `sql` with positional `params` and collect every row.
pub fn query_rows(conn: &Connection, sql: &str, params: &[Value]) -> rusqlite::Result<Rows> {
    tracing::debug!(sql, params = params.len(), "executing query");
    let mut stmt = conn.prepare(sql)?;
    let columns = stmt.column_count();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values: Row = Vec::with_capacity(columns);
        for i in 0..columns {
            values.push(from_value_ref(row.get_ref(i)?));
        }
        out.push(values);
    }
    Ok(out)
}

/// Run a statement that returns no rows; yields the number of changed rows.
pub fn execute(conn: &Connection, sql: &str, params: &[Value]) -> rusqlite::Result<usize> {
    tracing::debug!(sql, params = params.len(), "executing statement");
    conn.execute(sql, params_from_iter(params.iter()))
}

/// Pipeline operation reading its SQL from the arguments.
///
/// The statement is the `query` keyword argument, or else the first
/// positional argument; the remaining positional arguments bind in order.
/// Fails with [`rusqlite::Error::InvalidQuery`] when no text statement is
/// given.
pub fn query_args(conn: &mut Connection, args: &Args) -> rusqlite::Result<Rows> {
    let positional = args.positional();
    let (sql, params) = match args.get("query") {
        Some(Value::Text(sql)) => (sql.as_str(), positional),
        Some(_) => return Err(rusqlite::Error::InvalidQuery),
        None => match positional.split_first() {
            Some((Value::Text(sql), rest)) => (sql.as_str(), rest),
            _ => return Err(rusqlite::Error::InvalidQuery),
        },
    };
    query_rows(conn, sql, params)
}

/// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
///
/// ```rust
/// use querywell::sqlite::{execute, transactional};
/// use querywell::Value;
///
/// let mut conn = rusqlite::Connection::open_in_memory().unwrap();
/// conn.execute_batch("CREATE TABLE users (id INTEGER, email TEXT)").unwrap();
///
/// let result: Result<(), rusqlite::Error> = transactional(&mut conn, |tx| {
///     execute(tx, "INSERT INTO users VALUES (1, 'a@x.io')", &[])?;
///     execute(tx, "INSERT INTO nowhere VALUES (1)", &[])?;
///     Ok(())
/// });
///
/// assert!(result.is_err());
/// let count: i64 = conn.query_row("SELECT count(*) FROM users", [], |r| r.get(0)).unwrap();
/// assert_eq!(count, 0);
/// ```
pub fn transactional<T, E, F>(conn: &mut Connection, f: F) -> Result<T, E>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    E: From<rusqlite::Error> + std::fmt::Debug,
{
    let tx = conn.transaction()?;
    match f(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(error) => {
            tracing::warn!(?error, "transaction failed, rolling back");
            if let Err(rb_err) = tx.rollback() {
                tracing::error!(?rb_err, "rollback failed");
            }
            Err(error)
        }
    }
}

/// True for SQLite errors that typically clear on their own (busy or locked
/// database). Suitable for [`QueryPipeline::retry_if`](crate::QueryPipeline::retry_if).
pub fn is_transient(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(
            ffi::Error {
                code: ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked,
                ..
            },
            _
        )
    )
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Int(n),
        ValueRef::Real(x) => Value::Float(x),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sql;
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(Sql::Null),
            Value::Bool(b) => ToSqlOutput::Owned(Sql::Integer(i64::from(*b))),
            Value::Int(n) => ToSqlOutput::Owned(Sql::Integer(*n)),
            Value::Float(x) => ToSqlOutput::Owned(Sql::Real(*x)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::List(_) => {
                return Err(rusqlite::Error::ToSqlConversionFailure(
                    "list values cannot be bound as SQL parameters".into(),
                ))
            }
        })
    }
}
