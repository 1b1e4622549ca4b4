//! Relational storage for the tabulator.
//!
//! - [`SqliteStore`]: the single SQLite database a run writes into
//!
//! Rows are ordered maps from column name to SQLite value. Tables grow
//! columns monotonically as rows with new keys are inserted.

pub mod sqlite;

pub use sqlite::{PROPERTY_TABLE, SqliteStore};

use indexmap::IndexMap;

use crate::error::StoreError;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A single SQLite cell.
pub type Cell = rusqlite::types::Value;

/// One row: column name → value, in column order.
pub type Row = IndexMap<String, Cell>;

/// Rows returned by [`SqliteStore::query`], with the statement's column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Text of column `name` in every row (NULL and non-text cells skipped).
    pub fn texts(&self, name: &str) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| match row.get(name) {
                Some(Cell::Text(s)) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Build a text cell.
pub fn text(value: impl Into<String>) -> Cell {
    Cell::Text(value.into())
}

/// Quote an SQL identifier for SQLite.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
