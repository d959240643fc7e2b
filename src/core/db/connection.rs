/// Connection Module
///
/// The collaborator boundary between the metadata layer and a database
/// client. `Connection` enumerates the handful of driver operations the
/// layer needs; `SqliteConnection` implements it on top of rusqlite.

use crate::core::db::dialect::{Dialect, SqliteDialect};
use crate::core::error::DriverError;
use crate::core::value::{ResultSet, Row, Value};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use std::path::Path;
use tracing::debug;

/// Driver operations consumed by the metadata layer.
///
/// Implementations are used from one thread at a time; the facade serializes
/// access behind a mutex.
pub trait Connection: Send {
    /// SQL syntax of the underlying engine.
    fn dialect(&self) -> &dyn Dialect;

    /// Compiles `sql` without running it, reporting syntax errors early.
    fn prepare(&mut self, sql: &str) -> Result<(), DriverError>;

    /// Runs `sql` with positional parameters.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ResultSet, DriverError>;

    /// Runs `sql` without parameters.
    fn query(&mut self, sql: &str) -> Result<ResultSet, DriverError> {
        self.execute(sql, &[])
    }

    /// Quotes a string literal for direct interpolation.
    fn quote(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Id generated by the most recent insert, if the driver reports one.
    fn last_insert_id(&self) -> Option<String>;
}

/// SQLite implementation of [`Connection`].
#[derive(Debug)]
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    dialect: SqliteDialect,
}

impl SqliteConnection {
    /// Opens (or creates) the database file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DriverError> {
        debug!("Opening SQLite database at {:?}", path.as_ref());
        let conn = rusqlite::Connection::open(path)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, DriverError> {
        let conn = rusqlite::Connection::open_in_memory()?;
        Ok(Self::from_connection(conn))
    }

    /// Wraps an already configured rusqlite connection.
    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        SqliteConnection {
            conn,
            dialect: SqliteDialect,
        }
    }

    /// Access to the wrapped connection, e.g. for fixture setup.
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn prepare(&mut self, sql: &str) -> Result<(), DriverError> {
        self.conn.prepare_cached(sql)?;
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ResultSet, DriverError> {
        let mut stmt = self.conn.prepare_cached(sql)?;

        let expected = stmt.parameter_count();
        if expected != params.len() {
            return Err(DriverError::new(format!(
                "Statement expects {} parameters, {} given",
                expected,
                params.len()
            )));
        }

        for (i, value) in params.iter().enumerate() {
            stmt.raw_bind_parameter(i + 1, value)?;
        }

        if stmt.column_count() == 0 {
            let affected = stmt.raw_execute()?;
            return Ok(ResultSet::affected(affected));
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = Vec::new();
        let mut cursor = stmt.raw_query();
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(from_value_ref(row.get_ref(i)?));
            }
            rows.push(Row::new(columns.clone(), values));
        }

        Ok(ResultSet::from_rows(rows))
    }

    fn last_insert_id(&self) -> Option<String> {
        match self.conn.last_insert_rowid() {
            0 => None,
            id => Some(id.to_string()),
        }
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Bool(b) => ToSqlOutput::from(*b),
            Value::Int(i) => ToSqlOutput::from(*i),
            Value::Float(f) => ToSqlOutput::from(*f),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            nested => {
                let json = nested
                    .to_json()
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                ToSqlOutput::from(json)
            }
        })
    }
}
