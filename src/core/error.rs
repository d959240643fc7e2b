/// Tabula Error Module
///
/// This module defines the error types shared by the metadata layer. Schema
/// lookups, driver failures, configuration problems and attribute shape
/// mismatches each get their own variant so callers can match on them.
use std::fmt;
use thiserror::Error;

/// Failure reported by the underlying database driver.
///
/// Kept cloneable (unlike the native driver errors) so the same failure can be
/// stored in the error history and handed back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverError {
    /// Driver specific error code (SQLSTATE, extended result code, ...)
    pub code: Option<String>,
    /// Human readable message as reported by the driver
    pub message: String,
}

impl DriverError {
    /// Creates a driver error without a code.
    pub fn new(message: impl Into<String>) -> Self {
        DriverError {
            code: None,
            message: message.into(),
        }
    }

    /// Creates a driver error carrying the driver's own error code.
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        DriverError {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for DriverError {}

impl From<rusqlite::Error> for DriverError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(ffi_err, _) => {
                DriverError::with_code(ffi_err.extended_code.to_string(), err.to_string())
            }
            _ => DriverError::new(err.to_string()),
        }
    }
}

/// Structural precondition failures raised during schema discovery.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Table \"{0}\" not found")]
    TableNotFound(String),

    #[error("Table \"{0}\" has no columns")]
    EmptyTable(String),

    #[error("Column \"{column}\" not found in table \"{table}\"")]
    ColumnNotFound { table: String, column: String },

    /// The raw driver row cannot describe a column
    #[error("Invalid column definition: {0}")]
    InvalidColumn(String),

    /// The owning table reference is unusable
    #[error("Invalid table reference: {0}")]
    InvalidTable(String),
}

/// Error type for the tabula crate.
#[derive(Error, Debug)]
pub enum TabulaError {
    /// Table or column discovery errors
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// An attribute or argument had a different shape than requested
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Errors reported by the database driver
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A mutex guarding shared state was poisoned
    #[error("Lock error: {0}")]
    Lock(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for TabulaError {
    fn from(err: rusqlite::Error) -> Self {
        TabulaError::Driver(err.into())
    }
}

/// Type alias for Result to use TabulaError as the error type.
pub type Result<T> = std::result::Result<T, TabulaError>;
