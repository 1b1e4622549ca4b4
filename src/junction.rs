//! Association tables for properties too wide to inline.
//!
//! Each junction label of a type gets a `<type>_<label>` table with one row
//! per edge: `(sequence, entity_id, target_id, value)`. `sequence` is the
//! originating edge's row id, so `ORDER BY sequence` restores source order.

use indexmap::IndexMap;

use crate::flatten::{JunctionRow, junction_table};
use crate::store::{Cell, Row, SqliteStore, StoreResult, text};

const COLUMNS: [(&str, &str); 4] = [
    ("sequence", "INTEGER"),
    ("entity_id", "TEXT"),
    ("target_id", "TEXT"),
    ("value", "TEXT"),
];

const PRIMARY_KEY: [&str; 3] = ["sequence", "entity_id", "target_id"];

/// Writes queued junction rows for one entity type.
#[derive(Debug)]
pub struct JunctionWriter<'a> {
    store: &'a SqliteStore,
}

impl<'a> JunctionWriter<'a> {
    pub fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    /// Drop and recreate every junction table of `entity_type`, then insert
    /// `rows` in sequence order. Returns the row count per table.
    ///
    /// Tables are recreated for every label in `labels` even when no entity
    /// produced a row, so an emptied junction does not keep stale data.
    pub fn write(
        &self,
        entity_type: &str,
        labels: &[String],
        rows: &[JunctionRow],
    ) -> StoreResult<IndexMap<String, usize>> {
        let mut counts: IndexMap<String, usize> = labels
            .iter()
            .map(|label| (junction_table(entity_type, label), 0))
            .collect();
        for row in rows {
            counts.entry(row.table.clone()).or_default();
        }
        for table in counts.keys() {
            self.store.drop_table(table)?;
            self.store.create_table(table, &COLUMNS, &PRIMARY_KEY)?;
        }

        let mut ordered: Vec<&JunctionRow> = rows.iter().collect();
        ordered.sort_by_key(|r| r.sequence);
        for row in ordered {
            let mut record = Row::with_capacity(COLUMNS.len());
            record.insert("sequence".into(), Cell::Integer(row.sequence as i64));
            record.insert("entity_id".into(), text(row.entity_id.as_str()));
            record.insert(
                "target_id".into(),
                row.target_id.as_deref().map(text).unwrap_or(Cell::Null),
            );
            record.insert("value".into(), text(row.value.as_str()));
            self.store.insert_ignore(&row.table, &record)?;
            if let Some(n) = counts.get_mut(&row.table) {
                *n += 1;
            }
        }

        for (table, n) in &counts {
            tracing::info!(table = %table, rows = n, "wrote junction table");
        }
        Ok(counts)
    }
}
