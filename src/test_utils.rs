/// # Test Utilities Module
///
/// Fixtures shared by the unit tests:
/// - `ScriptedConnection`: a MySQL-flavoured connection that answers from
///   canned rows and logs every statement it runs
/// - `users_fixture`: the catalog rows of a small `app.users` table
/// - `SqliteFixture`: an in-memory SQLite database with a standard schema

use crate::core::db::connection::{Connection, SqliteConnection};
use crate::core::db::dialect::{Dialect, MySqlDialect};
use crate::core::error::{DriverError, Result};
use crate::core::value::{ResultSet, Row, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Script {
    /// Keyed by SQL and bound values
    exact: HashMap<(String, String), Vec<Row>>,
    /// Keyed by SQL only
    by_sql: HashMap<String, Vec<Row>>,
    failures: Vec<(String, bool, String)>,
    prepare_failures: HashMap<String, String>,
    executed: Vec<(String, Vec<Value>)>,
    last_insert_id: Option<String>,
}

fn params_key(params: &[Value]) -> String {
    params
        .iter()
        .map(|v| format!("{:?}", v))
        .collect::<Vec<_>>()
        .join("|")
}

/// Connection double speaking the MySQL dialect.
///
/// Clones share the same script, so a test can keep a handle after moving
/// the connection into a `Database`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnection {
    script: Arc<Mutex<Script>>,
    dialect: MySqlDialect,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows returned for `sql`, whatever it is bound with.
    pub fn respond(&self, sql: &str, rows: Vec<Row>) {
        self.script.lock().unwrap().by_sql.insert(sql.to_string(), rows);
    }

    /// Rows returned for `sql` bound with exactly `params`.
    pub fn respond_to(&self, sql: &str, params: &[Value], rows: Vec<Row>) {
        self.script
            .lock()
            .unwrap()
            .exact
            .insert((sql.to_string(), params_key(params)), rows);
    }

    /// Makes executions of exactly `sql` fail.
    pub fn fail(&self, sql: &str, message: &str) {
        self.script
            .lock()
            .unwrap()
            .failures
            .push((sql.to_string(), true, message.to_string()));
    }

    /// Makes executions of any statement containing `fragment` fail.
    pub fn fail_matching(&self, fragment: &str, message: &str) {
        self.script
            .lock()
            .unwrap()
            .failures
            .push((fragment.to_string(), false, message.to_string()));
    }

    pub fn fail_prepare(&self, sql: &str, message: &str) {
        self.script
            .lock()
            .unwrap()
            .prepare_failures
            .insert(sql.to_string(), message.to_string());
    }

    pub fn set_last_insert_id(&self, id: Option<&str>) {
        self.script.lock().unwrap().last_insert_id = id.map(str::to_string);
    }

    /// Every executed statement with its bound values, oldest first.
    pub fn executed(&self) -> Vec<(String, Vec<Value>)> {
        self.script.lock().unwrap().executed.clone()
    }

    pub fn count_matching(&self, fragment: &str) -> usize {
        self.executed()
            .iter()
            .filter(|(sql, _)| sql.contains(fragment))
            .count()
    }
}

impl Connection for ScriptedConnection {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn prepare(&mut self, sql: &str) -> std::result::Result<(), DriverError> {
        match self.script.lock().unwrap().prepare_failures.get(sql) {
            Some(message) => Err(DriverError::with_code("42000", message.clone())),
            None => Ok(()),
        }
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> std::result::Result<ResultSet, DriverError> {
        let mut script = self.script.lock().unwrap();
        script.executed.push((sql.to_string(), params.to_vec()));

        let failure = script.failures.iter().find(|(pattern, exact, _)| {
            if *exact {
                pattern == sql
            } else {
                sql.contains(pattern.as_str())
            }
        });
        if let Some((_, _, message)) = failure {
            return Err(DriverError::with_code("HY000", message.clone()));
        }

        let rows = script
            .exact
            .get(&(sql.to_string(), params_key(params)))
            .or_else(|| script.by_sql.get(sql))
            .cloned();
        match rows {
            Some(rows) => Ok(ResultSet::from_rows(rows)),
            None if sql.starts_with("INSERT") => Ok(ResultSet::affected(1)),
            None => Ok(ResultSet::default()),
        }
    }

    fn last_insert_id(&self) -> Option<String> {
        self.script.lock().unwrap().last_insert_id.clone()
    }
}

fn column_row(
    field: &str,
    ty: &str,
    collation: Option<&str>,
    null: &str,
    key: &str,
    default: Value,
    extra: &str,
) -> Row {
    Row::from_pairs([
        ("Field", Value::from(field)),
        ("Type", Value::from(ty)),
        ("Collation", Value::from(collation)),
        ("Null", Value::from(null)),
        ("Key", Value::from(key)),
        ("Default", default),
        ("Extra", Value::from(extra)),
        ("Privileges", Value::from("select,insert,update,references")),
        ("Comment", Value::from("")),
    ])
}

const UTF8: &str = "utf8mb4_unicode_ci";

/// Scripted catalog for `app.users`:
/// `id int(10) unsigned` auto-increment primary key, `name varchar(64)` not
/// null, `email varchar(255)` unique and nullable, `created_at timestamp`
/// defaulting to the current time.
pub fn users_fixture() -> ScriptedConnection {
    let conn = ScriptedConnection::new();
    conn.respond_to(
        "SHOW TABLE STATUS FROM `app` LIKE ?;",
        &[Value::from("users")],
        vec![Row::from_pairs([
            ("Name", Value::from("users")),
            ("Engine", Value::from("InnoDB")),
            ("Rows", Value::from("42")),
            ("Avg_row_length", Value::from(390)),
            ("Data_length", Value::from(16384)),
            ("Max_data_length", Value::from(0)),
            ("Index_length", Value::from(16384)),
            ("Data_free", Value::from(0)),
            ("Auto_increment", Value::from(43)),
            ("Collation", Value::from(UTF8)),
            ("Comment", Value::from("Registered users")),
        ])],
    );

    conn.respond(
        "SHOW FULL COLUMNS FROM `app`.`users`;",
        vec![
            column_row("id", "int(10) unsigned", None, "NO", "PRI", Value::Null, "auto_increment"),
            column_row("name", "varchar(64)", Some(UTF8), "NO", "", Value::Null, ""),
            column_row("email", "varchar(255)", Some(UTF8), "YES", "UNI", Value::Null, ""),
            column_row(
                "created_at",
                "timestamp",
                None,
                "YES",
                "",
                Value::from("CURRENT_TIMESTAMP"),
                "",
            ),
        ],
    );
    conn
}

/// In-memory SQLite database with a small standard schema.
pub struct SqliteFixture {
    pub connection: SqliteConnection,
}

impl SqliteFixture {
    pub fn new() -> Result<Self> {
        let connection = SqliteConnection::open_in_memory()?;
        connection.inner().execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email VARCHAR(255),
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                active BOOLEAN DEFAULT 1
            );

            CREATE TABLE post_categories (
                post_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL,
                note TEXT,
                PRIMARY KEY (post_id, category_id)
            );

            CREATE INDEX idx_users_email ON users (email);
        ",
        )?;
        Ok(SqliteFixture { connection })
    }
}

/// Error assertion helpers
pub mod error_testing {
    /// Asserts that `result` failed and its message mentions `fragment`.
    pub fn assert_error_contains<T, E>(result: &std::result::Result<T, E>, fragment: &str)
    where
        T: std::fmt::Debug,
        E: std::fmt::Display,
    {
        match result {
            Ok(value) => panic!("Expected an error mentioning '{}', got Ok({:?})", fragment, value),
            Err(err) => {
                let message = err.to_string();
                assert!(
                    message.to_lowercase().contains(&fragment.to_lowercase()),
                    "Expected '{}' in error message '{}'",
                    fragment,
                    message
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::db::table::TableMetadata;
    use crate::core::db::types::{ColumnDefault, TypeTag};
    use crate::database::Database;

    #[test]
    fn test_scripted_connection_logs_statements() {
        let mut conn = ScriptedConnection::new();
        conn.respond("SELECT 1", vec![Row::from_pairs([("1", 1)])]);
        let result = conn.execute("SELECT 1", &[]).unwrap();
        assert_eq!(result.row_count(), 1);
        assert_eq!(conn.count_matching("SELECT"), 1);

        conn.fail_matching("DROP", "denied");
        error_testing::assert_error_contains(&conn.execute("DROP TABLE t", &[]), "denied");
    }

    #[test]
    fn test_sqlite_fixture_discovery() {
        let fixture = SqliteFixture::new().unwrap();
        let db = Database::new(fixture.connection, Config::default()).unwrap();
        let table = TableMetadata::discover("users", &db).unwrap();

        assert_eq!(table.database(), "main");
        assert_eq!(table.qualified_name(), "\"main\".\"users\"");
        assert_eq!(table.primary_keys(), ["id".to_string()]);
        assert_eq!(table.required_columns(), ["username".to_string()]);
        assert_eq!(
            table.indexed_columns(),
            ["id".to_string(), "username".to_string(), "email".to_string()]
        );

        let id = table.column("id").unwrap();
        assert!(id.is_auto_increment());
        assert_eq!(id.type_tag(), TypeTag::Integer);

        let email = table.column("email").unwrap();
        assert_eq!(email.type_tag(), TypeTag::String);
        assert_eq!(email.length(), Some(255));

        let created = table.column("created_at").unwrap();
        assert_eq!(created.type_tag(), TypeTag::DateTime);
        assert_eq!(created.default(), &ColumnDefault::CurrentTimestamp);

        assert_eq!(table.column("active").unwrap().type_tag(), TypeTag::Bool);
    }
}
