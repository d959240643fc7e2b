/// Database Metadata Module
///
/// ## Architecture
///
/// - **Connection** (`connection.rs`): the driver boundary and its SQLite implementation
/// - **Dialect** (`dialect.rs`): engine-specific catalog queries, quoting and upsert syntax
/// - **Types** (`types.rs`): normalization of raw catalog attributes
/// - **Columns** (`column.rs`): per-column metadata and staged values
/// - **Tables** (`table.rs`): discovery, staging, formatting, validation and upsert
/// - **Statements** (`statement.rs`): execution with history and error recording
///
/// ## Error Handling
///
/// All operations return the crate's `TabulaError`; driver failures keep their
/// own code and message in `DriverError`.
pub mod column;
pub mod connection;
pub mod dialect;
pub mod statement;
pub mod table;
pub mod types;

pub use column::{Attribute, ColumnMetadata, Formatter, ValidationResult, Validator};
pub use connection::{Connection, SqliteConnection};
pub use dialect::{Dialect, MySqlDialect, SqliteDialect, UpsertPlan};
pub use statement::{StatementProxy, StatementState};
pub use table::{TableMetadata, TableStatus, ValidationOutcome};
pub use types::{ColumnDefault, TypeTag};
