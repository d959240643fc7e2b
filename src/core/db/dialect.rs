/// SQL Dialect Module
///
/// Engine-specific SQL text used by the metadata layer: identifier quoting,
/// the two catalog lookups run during discovery, and upsert rendering. The
/// catalog queries of every dialect return MySQL-shaped rows (`Name`,
/// `Rows`, `Field`, `Type`, `Key`, ...) so normalization works on a single
/// row shape.

/// Everything a dialect needs to render a single-table upsert.
#[derive(Debug, Clone)]
pub struct UpsertPlan<'a> {
    /// Already quoted `db.table` name
    pub qualified_table: &'a str,
    /// Staged columns in declaration order
    pub columns: &'a [String],
    /// All primary key columns of the table
    pub primary_keys: &'a [String],
}

impl<'a> UpsertPlan<'a> {
    /// The primary key when the table has exactly one.
    pub fn single_primary(&self) -> Option<&'a str> {
        let primary_keys: &'a [String] = self.primary_keys;
        match primary_keys {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }

    /// Staged columns that are not part of the primary key.
    pub fn update_columns(&self) -> impl Iterator<Item = &'a String> + 'a {
        let columns: &'a [String] = self.columns;
        let primary_keys: &'a [String] = self.primary_keys;
        let single = self.single_primary();
        columns
            .iter()
            .filter(move |c| match single {
                Some(pk) => c.as_str() != pk,
                None => !primary_keys.contains(c),
            })
    }
}

/// Strategy for engine-specific SQL syntax.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &str;

    /// Quotes an identifier (table, column, database name).
    fn quote_identifier(&self, name: &str) -> String;

    /// Query returning the current database name in its first column.
    fn current_database_sql(&self) -> &str;

    /// Table status lookup. Has exactly one `?` placeholder, bound to the bare
    /// table name.
    fn table_status_sql(&self, quoted_database: &str) -> String;

    /// Full column listing for `database.table`.
    fn columns_sql(&self, database: &str, table: &str) -> String;

    /// Renders the upsert statement with one positional placeholder per
    /// staged column.
    fn build_upsert(&self, plan: &UpsertPlan<'_>) -> String;

    /// Whether the upsert statement returns the affected primary key as a
    /// row instead of leaving it to the connection's last insert id.
    fn upsert_returns_key(&self) -> bool {
        false
    }

    fn qualify(&self, database: &str, table: &str) -> String {
        format!(
            "{}.{}",
            self.quote_identifier(database),
            self.quote_identifier(table)
        )
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

/// MySQL/MariaDB dialect.
#[derive(Debug, Clone, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn current_database_sql(&self) -> &str {
        "SELECT DATABASE()"
    }

    fn table_status_sql(&self, quoted_database: &str) -> String {
        format!("SHOW TABLE STATUS FROM {} LIKE ?;", quoted_database)
    }

    fn columns_sql(&self, database: &str, table: &str) -> String {
        format!("SHOW FULL COLUMNS FROM {};", self.qualify(database, table))
    }

    fn build_upsert(&self, plan: &UpsertPlan<'_>) -> String {
        let cols = plan
            .columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(",");

        let mut updates: Vec<String> = plan
            .update_columns()
            .map(|c| {
                let quoted = self.quote_identifier(c);
                format!("{}=VALUES({})", quoted, quoted)
            })
            .collect();

        // Keeps the auto-increment id resolvable through LAST_INSERT_ID()
        // even when the update changes nothing.
        if let Some(pk) = plan.single_primary() {
            let quoted = self.quote_identifier(pk);
            updates.push(format!("{}=LAST_INSERT_ID({})", quoted, quoted));
        }

        // Only composite key columns staged: rewrite them to themselves so
        // duplicates still go through ON DUPLICATE KEY UPDATE
        if updates.is_empty() {
            updates = plan
                .columns
                .iter()
                .map(|c| {
                    let quoted = self.quote_identifier(c);
                    format!("{}=VALUES({})", quoted, quoted)
                })
                .collect();
        }

        format!(
            "INSERT INTO {}\n({})\nVALUES\n({})\nON DUPLICATE KEY UPDATE\n{};",
            plan.qualified_table,
            cols,
            placeholders(plan.columns.len()),
            updates.join(",\n")
        )
    }
}

/// SQLite dialect.
///
/// The catalog queries run over `sqlite_master` and the `pragma_*` table
/// valued functions, aliased to the MySQL catalog column names.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    fn quote_literal(value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn current_database_sql(&self) -> &str {
        "SELECT 'main'"
    }

    fn table_status_sql(&self, quoted_database: &str) -> String {
        format!(
            "SELECT name AS Name, 'sqlite' AS Engine, NULL AS \"Rows\", NULL AS Avg_row_length, \
             NULL AS Data_length, NULL AS Max_data_length, NULL AS Index_length, \
             NULL AS Data_free, NULL AS Auto_increment, NULL AS Collation, '' AS Comment \
             FROM {}.sqlite_master WHERE type = 'table' AND name LIKE ?",
            quoted_database
        )
    }

    fn columns_sql(&self, database: &str, table: &str) -> String {
        let literal = Self::quote_literal(table);
        let schema = Self::quote_literal(database);
        format!(
            "SELECT ti.name AS Field, ti.type AS Type, NULL AS Collation, \
             CASE WHEN ti.\"notnull\" THEN 'NO' ELSE 'YES' END AS \"Null\", \
             CASE WHEN ti.pk > 0 THEN 'PRI' \
                  WHEN EXISTS (SELECT 1 FROM pragma_index_list({lit}, {schema}) AS il \
                               JOIN pragma_index_info(il.name, {schema}) AS ii \
                               WHERE ii.name = ti.name AND il.\"unique\") THEN 'UNI' \
                  WHEN EXISTS (SELECT 1 FROM pragma_index_list({lit}, {schema}) AS il \
                               JOIN pragma_index_info(il.name, {schema}) AS ii \
                               WHERE ii.name = ti.name) THEN 'MUL' \
                  ELSE '' END AS \"Key\", \
             ti.dflt_value AS \"Default\", \
             CASE WHEN ti.pk = 1 AND upper(ti.type) = 'INTEGER' \
                       AND (SELECT COUNT(*) FROM pragma_table_info({lit}, {schema}) WHERE pk > 0) = 1 \
                  THEN 'auto_increment' ELSE '' END AS Extra, \
             '' AS Comment \
             FROM pragma_table_info({lit}, {schema}) AS ti ORDER BY ti.cid",
            lit = literal,
            schema = schema
        )
    }

    fn build_upsert(&self, plan: &UpsertPlan<'_>) -> String {
        let cols = plan
            .columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(",");

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            plan.qualified_table,
            cols,
            placeholders(plan.columns.len())
        );

        if plan.primary_keys.is_empty() {
            sql.push_str(" ON CONFLICT DO NOTHING;");
            return sql;
        }

        let target = plan
            .primary_keys
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(",");

        let updates: Vec<String> = plan
            .update_columns()
            .map(|c| {
                let quoted = self.quote_identifier(c);
                format!("{}=excluded.{}", quoted, quoted)
            })
            .collect();

        if updates.is_empty() {
            sql.push_str(&format!(" ON CONFLICT({}) DO NOTHING", target));
        } else {
            sql.push_str(&format!(
                " ON CONFLICT({}) DO UPDATE SET {}",
                target,
                updates.join(",")
            ));
        }

        // last_insert_rowid() is left untouched by the update branch
        if let Some(pk) = plan.single_primary() {
            sql.push_str(&format!(" RETURNING {}", self.quote_identifier(pk)));
        }
        sql.push(';');
        sql
    }

    fn upsert_returns_key(&self) -> bool {
        true
    }
}
