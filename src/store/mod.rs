//! Tabular store: durable, queryable storage of named tables.

mod schema;
mod sqlite;

pub use schema::{check_identifier, ColumnDef, ColumnType, TableSchema};
pub use sqlite::TabularStore;
