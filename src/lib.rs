// Core infrastructure modules
pub mod config;
pub mod core;
pub mod database;

#[cfg(test)]
mod test_utils;

pub use crate::config::Config;
pub use crate::core::db::{
    ColumnMetadata, Connection, SqliteConnection, StatementProxy, TableMetadata, TypeTag,
};
pub use crate::core::{Result, TabulaError, Value};
pub use crate::database::{Database, SharedTable};
