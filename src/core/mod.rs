/// Core Module for Tabula
///
/// The value model, error types, diagnostic histories and the database
/// metadata layer itself.

pub mod db;
pub mod error;
pub mod history;
pub mod value;

// Re-export commonly used types for convenience
pub use error::{DriverError, Result, SchemaError, TabulaError};
pub use value::{ResultSet, Row, Value};
