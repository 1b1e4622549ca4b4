//! SQLite-backed table store using rusqlite.
//!
//! Owns the one connection a run writes through. Table schemas are created
//! on first insert and widened with `ALTER TABLE ... ADD COLUMN` when a row
//! carries columns the table has not seen yet.

use std::path::Path;

use rusqlite::{Connection, params, params_from_iter};

use crate::error::StoreError;
use crate::extract::PropertyEdge;
use crate::store::{Cell, QueryResult, Row, StoreResult, quote_ident};

/// Name of the control table holding every extracted edge.
pub const PROPERTY_TABLE: &str = "property";

/// Table store over a single SQLite database.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Create a fresh database at `path`, removing any previous file.
    pub fn create(path: &Path) -> StoreResult<Self> {
        if path.exists() {
            std::fs::remove_file(path).map_err(|e| StoreError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        let conn = Connection::open(path)?;
        // output is rebuilt from the crate on every run
        conn.pragma_update(None, "synchronous", 0)?;
        Ok(Self { conn })
    }

    /// An in-memory database (tests and dry runs).
    pub fn in_memory() -> StoreResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Replace the `property` table with `edges`.
    pub fn write_properties(&mut self, edges: &[PropertyEdge]) -> StoreResult<()> {
        self.drop_table(PROPERTY_TABLE)?;
        self.conn.execute_batch(
            "CREATE TABLE property (
                row_id INTEGER PRIMARY KEY,
                source_id TEXT,
                source_name TEXT,
                property_label TEXT,
                target_id TEXT,
                value TEXT
            );
            CREATE INDEX property_source ON property (source_id);",
        )?;
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO property (row_id, source_id, source_name, property_label, target_id, value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for edge in edges {
                stmt.execute(params![
                    edge.row_id as i64,
                    edge.source_id,
                    edge.source_name,
                    edge.property_label,
                    edge.target_id,
                    edge.value,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(rows = edges.len(), "wrote property table");
        Ok(())
    }

    pub fn drop_table(&self, table: &str) -> StoreResult<()> {
        self.conn
            .execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)), [])?;
        Ok(())
    }

    /// Column names of `table` in schema order (empty if it doesn't exist).
    pub fn columns(&self, table: &str) -> StoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
        Ok(names.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn has_table(&self, table: &str) -> StoreResult<bool> {
        Ok(!self.columns(table)?.is_empty())
    }

    /// Names of all tables, in creation order.
    pub fn tables(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY rowid")?;
        let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(names.collect::<Result<Vec<_>, _>>()?)
    }

    /// Create `table` with the given `(column, type)` pairs and primary key,
    /// unless it already exists.
    pub fn create_table(
        &self,
        table: &str,
        columns: &[(&str, &str)],
        primary_key: &[&str],
    ) -> StoreResult<()> {
        let mut defs: Vec<String> = columns
            .iter()
            .map(|(name, ty)| format!("{} {ty}", quote_ident(name)))
            .collect();
        if !primary_key.is_empty() {
            let key: Vec<String> = primary_key.iter().map(|k| quote_ident(k)).collect();
            defs.push(format!("PRIMARY KEY ({})", key.join(", ")));
        }
        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                quote_ident(table),
                defs.join(", ")
            ),
            [],
        )?;
        Ok(())
    }

    /// Add any columns of `row` that `table` lacks, in row order. Column
    /// names compare without ASCII case, as SQLite does.
    fn widen(&self, table: &str, row: &Row) -> StoreResult<()> {
        let mut existing = self.columns(table)?;
        for name in row.keys() {
            if existing.iter().any(|e| e.eq_ignore_ascii_case(name)) {
                continue;
            }
            existing.push(name.clone());
            self.conn.execute(
                &format!(
                    "ALTER TABLE {} ADD COLUMN {} TEXT",
                    quote_ident(table),
                    quote_ident(name)
                ),
                [],
            )?;
        }
        Ok(())
    }

    fn insert_with(&self, verb: &str, table: &str, row: &Row) -> StoreResult<()> {
        self.widen(table, row)?;
        let names: Vec<String> = row.keys().map(|k| quote_ident(k)).collect();
        let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "{verb} INTO {} ({}) VALUES ({})",
            quote_ident(table),
            names.join(", "),
            placeholders.join(", ")
        );
        self.conn.execute(&sql, params_from_iter(row.values()))?;
        Ok(())
    }

    /// Insert or overwrite `row`, creating `table` keyed by `key` if needed.
    pub fn insert_or_replace(&self, table: &str, row: &Row, key: &str) -> StoreResult<()> {
        self.create_table(table, &[(key, "TEXT")], &[key])?;
        self.insert_with("INSERT OR REPLACE", table, row)
    }

    /// Append `row`, ignoring it if it collides with an existing key.
    pub fn insert_ignore(&self, table: &str, row: &Row) -> StoreResult<()> {
        self.insert_with("INSERT OR IGNORE", table, row)
    }

    /// Run a statement and collect every row.
    pub fn query(&self, sql: &str, params: &[Cell]) -> StoreResult<QueryResult> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::with_capacity(columns.len());
            for (i, name) in columns.iter().enumerate() {
                record.insert(name.clone(), row.get::<_, Cell>(i)?);
            }
            out.push(record);
        }
        Ok(QueryResult { columns, rows: out })
    }

    /// Ids of entities tagged with `entity_type`, as stored in `property`.
    pub fn fetch_ids(&self, entity_type: &str) -> StoreResult<Vec<String>> {
        let result = self.query(
            "SELECT source_id FROM property
             WHERE property_label = '@type' AND value = ?1
             GROUP BY source_id
             ORDER BY MIN(row_id)",
            &[Cell::Text(entity_type.to_string())],
        )?;
        Ok(result.texts("source_id"))
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish()
    }
}
