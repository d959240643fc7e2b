/// Database Facade Module
///
/// `Database` owns the driver connection together with everything the
/// metadata layer keeps per connection: the statement and error histories,
/// the resolved database name and the cache of discovered tables.
///
/// One instance can additionally be installed process-wide through
/// [`Database::install_shared`], for callers that cannot thread a handle
/// through their code.

use crate::config::Config;
use crate::core::db::connection::Connection;
use crate::core::db::dialect::Dialect;
use crate::core::db::statement::StatementProxy;
use crate::core::db::table::TableMetadata;
use crate::core::error::{DriverError, Result, SchemaError, TabulaError};
use crate::core::history::{ErrorHistory, ErrorRecord, StatementEntry, StatementHistory};
use crate::core::value::{ResultSet, Value};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info};

/// A discovered table, shared between every caller that looked it up.
pub type SharedTable = Arc<Mutex<TableMetadata>>;

static SHARED: OnceCell<Database> = OnceCell::new();

struct CachedTable {
    /// `db.table` as reported by the catalog
    full_name: String,
    table: SharedTable,
}

/// Table names are compared case-insensitively, as in column lookups.
fn cache_key(database: &str, table: &str) -> String {
    format!("{}.{}", database, table).to_lowercase()
}

pub struct Database {
    conn: Mutex<Box<dyn Connection>>,
    config: Config,
    database_name: OnceCell<String>,
    history: Mutex<StatementHistory>,
    errors: Mutex<ErrorHistory>,
    tables: Mutex<HashMap<String, CachedTable>>,
}

fn lock<'a, T: ?Sized>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| TabulaError::Lock(format!("{} lock poisoned", what)))
}

impl Database {
    /// Wraps `conn`. Buffer capacities above the maximum are clamped.
    pub fn new<C: Connection + 'static>(conn: C, config: Config) -> Result<Self> {
        Self::from_boxed(Box::new(conn), config)
    }

    pub fn from_boxed(conn: Box<dyn Connection>, config: Config) -> Result<Self> {
        let config = config.validate()?;
        debug!(
            "Creating database facade (dialect: {}, history: {}, errors: {}, silent: {})",
            conn.dialect().name(),
            config.history_max,
            config.error_max,
            config.silent
        );

        Ok(Database {
            history: Mutex::new(StatementHistory::new(config.history_max)),
            errors: Mutex::new(ErrorHistory::new(config.error_max)),
            conn: Mutex::new(conn),
            config,
            database_name: OnceCell::new(),
            tables: Mutex::new(HashMap::new()),
        })
    }

    /// Installs `db` as the process-wide instance.
    ///
    /// Fails if an instance is already installed; the first one stays.
    pub fn install_shared(db: Database) -> Result<&'static Database> {
        SHARED
            .set(db)
            .map_err(|_| TabulaError::Config("A shared database is already installed".to_string()))?;
        info!("Installed shared database instance");
        SHARED
            .get()
            .ok_or_else(|| TabulaError::Config("Shared database missing after install".to_string()))
    }

    /// The process-wide instance, if one was installed.
    pub fn shared() -> Option<&'static Database> {
        SHARED.get()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs `f` with the connection's dialect.
    pub fn with_dialect<R>(&self, f: impl FnOnce(&dyn Dialect) -> R) -> Result<R> {
        let conn = lock(&self.conn, "connection")?;
        Ok(f(conn.dialect()))
    }

    /// Name of the database tables are resolved against.
    ///
    /// The configured name wins; otherwise the connection is asked once and
    /// the answer is kept for the lifetime of this instance.
    pub fn database_name(&self) -> Result<&str> {
        if let Some(name) = &self.config.database {
            return Ok(name.as_str());
        }

        self.database_name
            .get_or_try_init(|| {
                let sql = self.with_dialect(|d| d.current_database_sql().to_string())?;
                let mut stmt = self.prepare(&sql)?;
                stmt.execute_strict(None)?;
                let name = stmt
                    .fetch()
                    .and_then(|row| row.iter().next().and_then(|(_, v)| v.as_text()))
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| {
                        TabulaError::Config("No database selected on this connection".to_string())
                    })?;
                debug!("Resolved current database: {}", name);
                Ok(name)
            })
            .map(String::as_str)
    }

    /// Compiles `sql` and wraps it in a [`StatementProxy`].
    ///
    /// Compile failures are recorded in the error history and always
    /// returned, silent mode only applies to execution.
    pub fn prepare(&self, sql: &str) -> Result<StatementProxy<'_>> {
        let prepared = lock(&self.conn, "connection")?.prepare(sql);
        if let Err(err) = prepared {
            self.record_error(sql, Vec::new(), err.clone())?;
            return Err(err.into());
        }
        Ok(StatementProxy::new(self, sql))
    }

    /// Prepares and executes `sql` without parameters.
    ///
    /// Returns `None` when execution failed and the failure was silenced.
    pub fn query(&self, sql: &str) -> Result<Option<ResultSet>> {
        let mut stmt = self.prepare(sql)?;
        if !stmt.execute(None)? {
            return Ok(None);
        }
        Ok(stmt.into_result())
    }

    pub fn quote(&self, value: &str) -> Result<String> {
        Ok(lock(&self.conn, "connection")?.quote(value))
    }

    pub fn last_insert_id(&self) -> Result<Option<String>> {
        Ok(lock(&self.conn, "connection")?.last_insert_id())
    }

    /// Executed statements, most recent first.
    pub fn history(&self) -> Result<Vec<StatementEntry>> {
        Ok(lock(&self.history, "history")?.all())
    }

    /// Recorded driver failures, most recent first.
    pub fn errors(&self) -> Result<Vec<ErrorRecord>> {
        Ok(lock(&self.errors, "error history")?.all())
    }

    pub fn clear_history(&self) -> Result<()> {
        lock(&self.history, "history")?.clear();
        Ok(())
    }

    pub fn clear_errors(&self) -> Result<()> {
        lock(&self.errors, "error history")?.clear();
        Ok(())
    }

    pub(crate) fn record_statement(&self, sql: &str, binds: Vec<Value>) -> Result<()> {
        debug!("Executing SQL: {} ({} binds)", sql, binds.len());
        lock(&self.history, "history")?.record(StatementEntry::new(sql, binds));
        Ok(())
    }

    pub(crate) fn record_error(&self, sql: &str, binds: Vec<Value>, err: DriverError) -> Result<()> {
        error!("Statement failed: {} ({})", err, sql);
        lock(&self.errors, "error history")?.record(ErrorRecord::new(sql, binds, err));
        Ok(())
    }

    /// Runs a statement on the connection. The outer result carries lock
    /// failures, the inner one the driver outcome.
    pub(crate) fn run(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<std::result::Result<ResultSet, DriverError>> {
        Ok(lock(&self.conn, "connection")?.execute(sql, params))
    }

    /// Splits a table reference into `(database, table)`.
    ///
    /// Quotes and backticks are stripped; a `db.table` reference overrides the
    /// default database.
    pub fn resolve_table_name(&self, name: &str) -> Result<(String, String)> {
        let cleaned: String = name
            .chars()
            .filter(|c| !matches!(c, '`' | '\'' | '"'))
            .collect();
        let cleaned = cleaned.trim();

        let (database, table) = match cleaned.split_once('.') {
            Some((database, table)) if !database.is_empty() => {
                (database.to_string(), table.to_string())
            }
            Some((_, table)) => (self.database_name()?.to_string(), table.to_string()),
            None => (self.database_name()?.to_string(), cleaned.to_string()),
        };

        if table.is_empty() {
            return Err(SchemaError::InvalidTable(name.to_string()).into());
        }
        Ok((database, table))
    }

    /// Metadata for `name`, discovered on first use and cached afterwards.
    ///
    /// Every lookup of the same table returns the same shared instance, so
    /// values staged through one handle are visible through all of them.
    pub fn table(&self, name: &str) -> Result<SharedTable> {
        let (database, table) = self.resolve_table_name(name)?;
        let key = cache_key(&database, &table);

        let mut tables = lock(&self.tables, "table cache")?;
        if let Some(cached) = tables.get(&key) {
            debug!("Table cache hit for {}", cached.full_name);
            return Ok(Arc::clone(&cached.table));
        }

        debug!("Table cache miss for {}, discovering", key);
        let discovered = TableMetadata::discover_in(self, &database, &table)?;
        let full_name = discovered.full_name();
        let shared = Arc::new(Mutex::new(discovered));
        tables.insert(
            key,
            CachedTable {
                full_name,
                table: Arc::clone(&shared),
            },
        );
        Ok(shared)
    }

    /// Drops the cached metadata for `name`. Returns whether an entry was
    /// removed; handles already given out keep working on the old metadata.
    pub fn invalidate(&self, name: &str) -> Result<bool> {
        let (database, table) = self.resolve_table_name(name)?;
        let removed = lock(&self.tables, "table cache")?.remove(&cache_key(&database, &table));
        if let Some(cached) = &removed {
            info!("Invalidated cached metadata for {}", cached.full_name);
        }
        Ok(removed.is_some())
    }

    pub fn invalidate_all(&self) -> Result<()> {
        let mut tables = lock(&self.tables, "table cache")?;
        info!("Invalidated {} cached tables", tables.len());
        tables.clear();
        Ok(())
    }

    /// Full names of the tables currently cached.
    pub fn cached_tables(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = lock(&self.tables, "table cache")?
            .values()
            .map(|cached| cached.full_name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("database_name", &self.database_name.get())
            .finish_non_exhaustive()
    }
}
