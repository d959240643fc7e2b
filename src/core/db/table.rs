/// Table Metadata Module
///
/// Discovers a table's status and columns from the database catalog and
/// keeps per-column staged values, formatters and validators. Staged values
/// can be written back with a single upsert statement.

use crate::core::db::column::{ColumnMetadata, ValidationResult};
use crate::core::db::dialect::UpsertPlan;
use crate::core::db::types::{decode_text, normalize_charset};
use crate::core::error::{Result, SchemaError};
use crate::core::value::{Row, Value};
use crate::database::Database;
use tracing::{debug, warn};

/// Normalized `SHOW TABLE STATUS` row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableStatus {
    pub name: String,
    pub engine: Option<String>,
    pub rows: i64,
    pub avg_row_length: i64,
    pub data_length: i64,
    pub max_data_length: i64,
    pub index_length: i64,
    pub data_free: i64,
    pub auto_increment: i64,
    pub collation: Option<String>,
    /// Derived from the collation
    pub charset: Option<String>,
    pub comment: Option<String>,
}

impl TableStatus {
    fn from_row(raw: &Row) -> Self {
        let int = |key: &str| raw.get(key).map(Value::to_int).unwrap_or(0);
        let collation = raw.get_text("Collation").filter(|c| !c.is_empty());
        let charset = collation.as_deref().and_then(normalize_charset);
        let comment = raw
            .get("Comment")
            .and_then(|c| decode_text(c, charset.as_deref()));

        TableStatus {
            name: raw.get_text("Name").unwrap_or_default(),
            engine: raw.get_text("Engine"),
            rows: int("Rows"),
            avg_row_length: int("Avg_row_length"),
            data_length: int("Data_length"),
            max_data_length: int("Max_data_length"),
            index_length: int("Index_length"),
            data_free: int("Data_free"),
            auto_increment: int("Auto_increment"),
            collation,
            charset,
            comment,
        }
    }
}

/// Validation result of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub column: String,
    pub result: ValidationResult,
}

#[derive(Debug)]
pub struct TableMetadata {
    name: String,
    database: String,
    qualified_name: String,
    raw_status: Row,
    status: TableStatus,
    columns: Vec<ColumnMetadata>,
    primary_keys: Vec<String>,
    required_columns: Vec<String>,
    indexed_columns: Vec<String>,
    last_insert_id: Option<String>,
}

impl TableMetadata {
    /// Discovers `name` (`table` or `db.table`, quotes allowed) through `db`.
    ///
    /// This always queries the catalog; use [`Database::table`] for the
    /// cached lookup.
    pub fn discover(name: &str, db: &Database) -> Result<TableMetadata> {
        let (database, table) = db.resolve_table_name(name)?;
        Self::discover_in(db, &database, &table)
    }

    pub(crate) fn discover_in(db: &Database, database: &str, table: &str) -> Result<TableMetadata> {
        let full_name = format!("{}.{}", database, table);
        debug!("Discovering table {}", full_name);

        let status_sql = db.with_dialect(|d| d.table_status_sql(&d.quote_identifier(database)))?;
        let mut stmt = db.prepare(&status_sql)?;
        stmt.execute_strict(Some(&[Value::from(table)]))?;
        let mut candidates = stmt.fetch_all();

        // LIKE treats `_` and `%` as wildcards, only the exact name counts
        let position = candidates
            .iter()
            .position(|row| {
                row.get_text("Name")
                    .map_or(false, |n| n.eq_ignore_ascii_case(table))
            })
            .ok_or_else(|| SchemaError::TableNotFound(full_name.clone()))?;
        let raw_status = candidates.swap_remove(position);

        let name = raw_status
            .get_text("Name")
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| table.to_string());
        let full_name = format!("{}.{}", database, name);

        let (qualified_name, columns_sql) =
            db.with_dialect(|d| (d.qualify(database, &name), d.columns_sql(database, &name)))?;
        let mut stmt = db.prepare(&columns_sql)?;
        stmt.execute_strict(None)?;
        let rows = stmt.fetch_all();
        if rows.is_empty() {
            return Err(SchemaError::EmptyTable(full_name).into());
        }

        let status = TableStatus::from_row(&raw_status);
        let columns = rows
            .into_iter()
            .map(|row| ColumnMetadata::with_table_charset(&full_name, row, status.charset.as_deref()))
            .collect::<Result<Vec<_>>>()?;

        let names_where = |pred: fn(&ColumnMetadata) -> bool| -> Vec<String> {
            columns
                .iter()
                .filter(|c| pred(c))
                .map(|c| c.name().to_string())
                .collect()
        };
        let primary_keys = names_where(ColumnMetadata::is_primary);
        let required_columns = names_where(ColumnMetadata::is_required);
        let indexed_columns = names_where(ColumnMetadata::is_indexed);

        debug!(
            "Discovered {} with {} columns (primary keys: {:?})",
            full_name,
            columns.len(),
            primary_keys
        );

        Ok(TableMetadata {
            name,
            database: database.to_string(),
            qualified_name,
            raw_status,
            status,
            columns,
            primary_keys,
            required_columns,
            indexed_columns,
            last_insert_id: None,
        })
    }

    /// Bare table name as reported by the catalog.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Dialect-quoted `db.table`, ready for interpolation into SQL.
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Unquoted `db.table`.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.database, self.name)
    }

    pub fn status(&self) -> &TableStatus {
        &self.status
    }

    pub fn raw_status(&self) -> &Row {
        &self.raw_status
    }

    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    pub fn required_columns(&self) -> &[String] {
        &self.required_columns
    }

    pub fn indexed_columns(&self) -> &[String] {
        &self.indexed_columns
    }

    /// Id reported by the last successful upsert.
    pub fn last_insert_id(&self) -> Option<&str> {
        self.last_insert_id.as_deref()
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut ColumnMetadata> {
        self.columns
            .iter_mut()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// Like [`column`](Self::column) but fails for unknown names.
    pub fn require_column(&self, name: &str) -> Result<&ColumnMetadata> {
        self.column(name).ok_or_else(|| {
            SchemaError::ColumnNotFound {
                table: self.full_name(),
                column: name.to_string(),
            }
            .into()
        })
    }

    /// Stages a value on the named column. Unknown columns are ignored.
    pub fn set_value(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        match self.column_mut(name) {
            Some(column) => {
                column.set_value(value);
            }
            None => debug!("Ignoring value for unknown column {}", name),
        }
        self
    }

    pub fn set_values<I, K, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (name, value) in values {
            self.set_value(name.as_ref(), value);
        }
        self
    }

    /// Staged values in declaration order, formatters applied.
    pub fn values(&self) -> Vec<(String, Value)> {
        self.columns
            .iter()
            .filter_map(|c| c.value().map(|v| (c.name().to_string(), v)))
            .collect()
    }

    pub fn value(&self, name: &str) -> Option<Value> {
        self.column(name).and_then(ColumnMetadata::value)
    }

    pub fn set_formatter<F>(&mut self, name: &str, formatter: F) -> &mut Self
    where
        F: Fn(&ColumnMetadata, Value) -> Value + Send + 'static,
    {
        if let Some(column) = self.column_mut(name) {
            column.set_formatter(formatter);
        }
        self
    }

    pub fn set_validator<F>(&mut self, name: &str, validator: F) -> &mut Self
    where
        F: Fn(&ColumnMetadata, &Value) -> ValidationResult + Send + 'static,
    {
        if let Some(column) = self.column_mut(name) {
            column.set_validator(validator);
        }
        self
    }

    /// Applies every registered formatter to its staged value.
    ///
    /// Returns the number of values rewritten, or `None` when no column has a
    /// formatter.
    pub fn format(&mut self) -> Option<usize> {
        if !self.columns.iter().any(ColumnMetadata::has_formatter) {
            return None;
        }
        Some(
            self.columns
                .iter_mut()
                .map(ColumnMetadata::format_in_place)
                .filter(|formatted| *formatted)
                .count(),
        )
    }

    /// Runs every registered validator, in column order.
    ///
    /// Returns `None` when no column has a validator. Columns with nothing
    /// staged are validated against `Null`.
    pub fn validate(&self) -> Option<Vec<ValidationOutcome>> {
        let outcomes: Vec<ValidationOutcome> = self
            .columns
            .iter()
            .filter(|c| c.has_validator())
            .map(|c| ValidationOutcome {
                column: c.name().to_string(),
                result: c.validation(),
            })
            .collect();

        if outcomes.is_empty() {
            None
        } else {
            Some(outcomes)
        }
    }

    /// Failed validations as `(column, message)` pairs.
    pub fn validation_errors(&self) -> Vec<(String, String)> {
        self.validate()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|outcome| outcome.result.err().map(|msg| (outcome.column, msg)))
            .collect()
    }

    /// Writes the staged values with a single insert-or-update statement.
    ///
    /// Returns `Ok(false)` when nothing is staged or when a failure was
    /// silenced. Staged values are kept either way.
    pub fn upsert(&mut self, db: &Database) -> Result<bool> {
        self.upsert_with(db, |_| {})
    }

    /// Same as [`upsert`](Self::upsert); `on_success` receives the generated
    /// id when the driver reports one.
    pub fn upsert_with<F>(&mut self, db: &Database, on_success: F) -> Result<bool>
    where
        F: FnOnce(&str),
    {
        let staged = self.values();
        if staged.is_empty() {
            warn!("Nothing staged for {}, skipping upsert", self.full_name());
            return Ok(false);
        }

        let (columns, binds): (Vec<String>, Vec<Value>) = staged.into_iter().unzip();
        let plan = UpsertPlan {
            qualified_table: &self.qualified_name,
            columns: &columns,
            primary_keys: &self.primary_keys,
        };
        let (sql, returns_key) =
            db.with_dialect(|d| (d.build_upsert(&plan), d.upsert_returns_key()))?;
        debug!("Upserting {} columns into {}", columns.len(), self.full_name());

        let mut stmt = db.prepare(&sql)?;
        if !stmt.execute(Some(&binds))? {
            return Ok(false);
        }

        let id = if returns_key {
            stmt.fetch()
                .and_then(|row| row.iter().next().map(|(_, v)| v.to_string()))
        } else {
            db.last_insert_id()?
        };
        if let Some(id) = id.filter(|id| !id.is_empty() && id != "0") {
            on_success(&id);
            self.last_insert_id = Some(id);
        }
        Ok(true)
    }

    /// Removes every staged value.
    pub fn clear_values(&mut self) -> &mut Self {
        for column in &mut self.columns {
            column.remove_value();
        }
        self
    }

    /// Removes staged values, formatters and validators.
    pub fn clear_all(&mut self) -> &mut Self {
        for column in &mut self.columns {
            column.remove_value().remove_formatter().remove_validator();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::db::types::TypeTag;
    use crate::core::error::TabulaError;
    use crate::test_utils::{users_fixture, ScriptedConnection};
    use std::sync::{Arc, Mutex};

    fn database(silent: bool) -> (Database, ScriptedConnection) {
        let conn = users_fixture();
        let config = Config {
            database: Some("app".to_string()),
            silent,
            ..Config::default()
        };
        (Database::new(conn.clone(), config).unwrap(), conn)
    }

    #[test]
    fn test_discovery() {
        let (db, conn) = database(false);
        let table = TableMetadata::discover("`users`", &db).unwrap();

        assert_eq!(table.name(), "users");
        assert_eq!(table.database(), "app");
        assert_eq!(table.qualified_name(), "`app`.`users`");
        assert_eq!(table.full_name(), "app.users");
        assert_eq!(table.primary_keys(), ["id".to_string()]);
        assert_eq!(table.required_columns(), ["id".to_string(), "name".to_string()]);
        assert_eq!(table.indexed_columns(), ["id".to_string(), "email".to_string()]);

        let status = table.status();
        assert_eq!(status.engine.as_deref(), Some("InnoDB"));
        assert_eq!(status.rows, 42);
        assert_eq!(status.auto_increment, 43);
        assert_eq!(status.charset.as_deref(), Some("utf8"));
        assert_eq!(status.comment.as_deref(), Some("Registered users"));

        let id = table.column("ID").unwrap();
        assert_eq!(id.type_tag(), TypeTag::Integer);
        assert!(id.is_unsigned());
        assert!(id.is_auto_increment());

        let executed = conn.executed();
        assert_eq!(executed[0].0, "SHOW TABLE STATUS FROM `app` LIKE ?;");
        assert_eq!(executed[0].1, vec![Value::from("users")]);
        assert_eq!(executed[1].0, "SHOW FULL COLUMNS FROM `app`.`users`;");
        // Both catalog lookups go through the statement history
        assert_eq!(db.history().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_table() {
        let (db, conn) = database(false);
        let err = TableMetadata::discover("ghosts", &db).unwrap_err();
        match err {
            TabulaError::Schema(SchemaError::TableNotFound(name)) => assert_eq!(name, "app.ghosts"),
            other => panic!("Expected TableNotFound, got {:?}", other),
        }
        // No column listing for a missing table
        assert_eq!(conn.count_matching("SHOW FULL COLUMNS"), 0);
    }

    #[test]
    fn test_wildcard_lookalike_is_not_discovered() {
        let (db, conn) = database(false);
        conn.respond_to(
            "SHOW TABLE STATUS FROM `app` LIKE ?;",
            &[Value::from("user_x")],
            vec![Row::from_pairs([("Name", "userAx")])],
        );

        match TableMetadata::discover("user_x", &db) {
            Err(TabulaError::Schema(SchemaError::TableNotFound(name))) => {
                assert_eq!(name, "app.user_x")
            }
            other => panic!("Expected TableNotFound, got {:?}", other),
        }
        assert_eq!(conn.count_matching("SHOW FULL COLUMNS"), 0);
    }

    #[test]
    fn test_table_without_columns() {
        let (db, conn) = database(false);
        conn.respond(
            "SHOW TABLE STATUS FROM `app` LIKE ?;",
            vec![Row::from_pairs([("Name", "hollow")])],
        );
        conn.respond("SHOW FULL COLUMNS FROM `app`.`hollow`;", vec![]);

        let err = TableMetadata::discover("hollow", &db).unwrap_err();
        assert!(matches!(
            err,
            TabulaError::Schema(SchemaError::EmptyTable(_))
        ));
    }

    #[test]
    fn test_discovery_raises_even_when_silent() {
        let (db, conn) = database(true);
        conn.fail("SHOW TABLE STATUS FROM `app` LIKE ?;", "Access denied");
        assert!(matches!(
            TableMetadata::discover("users", &db),
            Err(TabulaError::Driver(_))
        ));
        assert_eq!(db.errors().unwrap().len(), 1);
    }

    #[test]
    fn test_staging() {
        let (db, _) = database(false);
        let mut table = TableMetadata::discover("users", &db).unwrap();

        table.set_values([("name", Value::from("x")), ("nope", Value::from(1)), ("ID", Value::from(5))]);
        assert_eq!(
            table.values(),
            vec![
                ("id".to_string(), Value::from(5)),
                ("name".to_string(), Value::from("x")),
            ]
        );
        assert_eq!(table.value("NAME"), Some(Value::from("x")));
        assert!(table.require_column("nope").is_err());

        table.clear_values();
        assert!(table.values().is_empty());
    }

    #[test]
    fn test_format_and_validate() {
        let (db, _) = database(false);
        let mut table = TableMetadata::discover("users", &db).unwrap();
        assert_eq!(table.format(), None);
        assert_eq!(table.validate(), None);

        table
            .set_formatter("email", |_, v| Value::from(v.to_string().to_lowercase()))
            .set_validator("name", |column, v| {
                if v.is_null() && column.is_required() {
                    Err(format!("{} is required", column.name()))
                } else {
                    Ok(())
                }
            })
            .set_formatter("missing", |_, v| v);

        table.set_value("email", "A@B.COM");
        assert_eq!(table.value("email"), Some(Value::from("a@b.com")));
        assert_eq!(table.format(), Some(1));
        assert_eq!(table.column("email").unwrap().raw_value(), Some(&Value::from("a@b.com")));

        let outcomes = table.validate().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].column, "name");
        assert!(outcomes[0].result.is_err());
        assert_eq!(
            table.validation_errors(),
            vec![("name".to_string(), "name is required".to_string())]
        );

        table.set_value("name", "x");
        assert!(table.validation_errors().is_empty());

        table.clear_all();
        assert_eq!(table.format(), None);
        assert_eq!(table.validate(), None);
        assert!(table.values().is_empty());
    }

    #[test]
    fn test_formatter_replaced_after_format() {
        let (db, _) = database(false);
        let mut table = TableMetadata::discover("users", &db).unwrap();

        table
            .set_value("name", "Ab")
            .set_formatter("name", |_, v| Value::from(v.to_string().to_lowercase()));
        assert_eq!(table.format(), Some(1));

        table.set_formatter("name", |_, v| Value::from(format!("{}!", v)));
        assert_eq!(table.value("name"), Some(Value::from("ab!")));
    }

    #[test]
    fn test_upsert_sql_and_binds() {
        let (db, conn) = database(false);
        conn.set_last_insert_id(Some("5"));
        let mut table = TableMetadata::discover("users", &db).unwrap();

        let seen = Arc::new(Mutex::new(None));
        let seen_in_callback = Arc::clone(&seen);
        let ok = table
            .set_values([("id", Value::from(5)), ("name", Value::from("x"))])
            .upsert_with(&db, move |id| {
                *seen_in_callback.lock().unwrap() = Some(id.to_string());
            })
            .unwrap();

        assert!(ok);
        let (sql, binds) = conn.executed().last().cloned().unwrap();
        assert_eq!(
            sql,
            "INSERT INTO `app`.`users`\n(`id`,`name`)\nVALUES\n(?,?)\nON DUPLICATE KEY UPDATE\n`name`=VALUES(`name`),\n`id`=LAST_INSERT_ID(`id`);"
        );
        assert_eq!(binds, vec![Value::from(5), Value::from("x")]);
        assert_eq!(table.last_insert_id(), Some("5"));
        assert_eq!(seen.lock().unwrap().as_deref(), Some("5"));
        // Staged values survive the write
        assert_eq!(table.values().len(), 2);
    }

    #[test]
    fn test_upsert_without_reported_id() {
        let (db, conn) = database(false);
        conn.set_last_insert_id(Some("0"));
        let mut table = TableMetadata::discover("users", &db).unwrap();

        let mut called = false;
        let ok = table
            .set_value("name", "x")
            .upsert_with(&db, |_| called = true)
            .unwrap();
        assert!(ok);
        assert!(!called);
        assert_eq!(table.last_insert_id(), None);
    }

    #[test]
    fn test_upsert_nothing_staged() {
        let (db, conn) = database(false);
        let mut table = TableMetadata::discover("users", &db).unwrap();
        let before = conn.executed().len();
        assert!(!table.upsert(&db).unwrap());
        assert_eq!(conn.executed().len(), before);
    }

    #[test]
    fn test_upsert_failure() {
        let (db, conn) = database(false);
        let mut table = TableMetadata::discover("users", &db).unwrap();
        conn.fail_matching("INSERT INTO", "Column 'name' cannot be null");

        let err = table.set_value("id", 1).upsert(&db).unwrap_err();
        assert!(matches!(err, TabulaError::Driver(_)));
        assert_eq!(db.errors().unwrap().len(), 1);
    }

    #[test]
    fn test_silent_upsert_failure() {
        let (db, conn) = database(true);
        let mut table = TableMetadata::discover("users", &db).unwrap();
        conn.fail_matching("INSERT INTO", "Column 'name' cannot be null");

        assert!(!table.set_value("id", 1).upsert(&db).unwrap());
        assert_eq!(db.errors().unwrap().len(), 1);
        assert_eq!(table.last_insert_id(), None);
    }
}
