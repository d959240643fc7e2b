/// Statement Proxy Module
///
/// Wraps statement execution so every run lands in the statement history
/// and every driver failure lands in the error history, whatever the caller
/// does with the outcome afterwards.

use crate::core::error::Result;
use crate::core::value::{ResultSet, Row, Value};
use crate::database::Database;
use tracing::warn;

/// Lifecycle of a [`StatementProxy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    Created,
    /// At least one value has been bound
    Bound,
    Succeeded,
    Failed,
}

/// A prepared statement tied to a [`Database`].
///
/// Bound values are buffered locally, so an `execute(None)` after a series
/// of `bind_value` calls is logged with the exact values it ran with.
#[derive(Debug)]
pub struct StatementProxy<'db> {
    db: &'db Database,
    sql: String,
    binds: Vec<(usize, Value)>,
    state: StatementState,
    result: Option<ResultSet>,
    cursor: usize,
}

impl<'db> StatementProxy<'db> {
    pub(crate) fn new(db: &'db Database, sql: impl Into<String>) -> Self {
        StatementProxy {
            db,
            sql: sql.into(),
            binds: Vec::new(),
            state: StatementState::Created,
            result: None,
            cursor: 0,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn state(&self) -> StatementState {
        self.state
    }

    /// Binds `value` to the 1-based placeholder `position`.
    pub fn bind_value(&mut self, position: usize, value: impl Into<Value>) -> &mut Self {
        self.binds.push((position, value.into()));
        self.state = StatementState::Bound;
        self
    }

    /// Same as [`bind_value`](Self::bind_value); the value is captured at
    /// bind time.
    pub fn bind_param(&mut self, position: usize, value: &Value) -> &mut Self {
        self.bind_value(position, value.clone())
    }

    /// Values bound so far, ordered by position.
    pub fn bound_values(&self) -> Vec<Value> {
        let mut binds = self.binds.clone();
        binds.sort_by_key(|(position, _)| *position);
        binds.into_iter().map(|(_, value)| value).collect()
    }

    /// Executes the statement.
    ///
    /// Explicit non-empty `values` take precedence over buffered binds (the
    /// buffer is drained either way). Returns `Ok(true)` on success. On driver
    /// failure the error is recorded, then returned, or swallowed with
    /// `Ok(false)` when the database is configured as silent.
    pub fn execute(&mut self, values: Option<&[Value]>) -> Result<bool> {
        let silent = self.db.config().silent;
        self.run(values, silent)
    }

    /// Like [`execute`](Self::execute) but never silences driver failures.
    pub fn execute_strict(&mut self, values: Option<&[Value]>) -> Result<bool> {
        self.run(values, false)
    }

    fn run(&mut self, values: Option<&[Value]>, silent: bool) -> Result<bool> {
        let buffered = self.bound_values();
        self.binds.clear();
        let values = match values {
            Some(values) if !values.is_empty() => values.to_vec(),
            _ => buffered,
        };

        self.db.record_statement(&self.sql, values.clone())?;
        self.result = None;
        self.cursor = 0;

        match self.db.run(&self.sql, &values)? {
            Ok(result) => {
                self.result = Some(result);
                self.state = StatementState::Succeeded;
                Ok(true)
            }
            Err(err) => {
                self.state = StatementState::Failed;
                self.db.record_error(&self.sql, values, err.clone())?;
                if silent {
                    warn!("Suppressed statement failure: {}", err);
                    Ok(false)
                } else {
                    Err(err.into())
                }
            }
        }
    }

    /// Next row of the last successful execution.
    pub fn fetch(&mut self) -> Option<Row> {
        let row = self.result.as_ref()?.rows.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(row)
    }

    /// All rows not fetched yet.
    pub fn fetch_all(&mut self) -> Vec<Row> {
        let rows = match &self.result {
            Some(result) => result.rows[self.cursor.min(result.rows.len())..].to_vec(),
            None => Vec::new(),
        };
        self.cursor += rows.len();
        rows
    }

    /// Rows returned, or rows affected for writes.
    pub fn row_count(&self) -> usize {
        match &self.result {
            Some(result) if result.rows.is_empty() => result.affected,
            Some(result) => result.rows.len(),
            None => 0,
        }
    }

    pub fn into_result(self) -> Option<ResultSet> {
        self.result
    }
}
