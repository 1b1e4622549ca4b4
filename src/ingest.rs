//! CSV ingestion: load CSV files shipped inside a crate into `csv_files`.
//!
//! First record is the header; each header names a column. Later files add
//! their new headers as new columns. When a file has an `id` column it is
//! the table key and duplicate ids are skipped.

use std::path::{Path, PathBuf};

use crate::delimited::parse_csv;
use crate::extract::EdgeSet;
use crate::store::{Cell, Row, SqliteStore, StoreResult, text};

/// Table receiving ingested CSV rows.
pub const CSV_TABLE: &str = "csv_files";

/// Result of ingesting CSV files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub files: usize,
    pub rows: usize,
    /// Files listed in the crate that could not be read.
    pub skipped: Vec<PathBuf>,
}

/// Ids of `File` entities that name a CSV file.
pub fn csv_file_ids(edges: &EdgeSet) -> Vec<String> {
    edges
        .ids_of_type("File")
        .into_iter()
        .filter(|id| id.to_lowercase().ends_with(".csv"))
        .collect()
}

/// Ingest every CSV `File` of the crate rooted at `crate_dir`.
pub fn ingest_csv_files(
    store: &SqliteStore,
    edges: &EdgeSet,
    crate_dir: &Path,
) -> StoreResult<IngestSummary> {
    let mut summary = IngestSummary::default();
    for id in csv_file_ids(edges) {
        let relative = id.trim_start_matches("./").replace('#', "");
        let path = crate_dir.join(relative);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                summary.rows += ingest_csv(store, &content, CSV_TABLE)?;
                summary.files += 1;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping CSV file");
                summary.skipped.push(path);
            }
        }
    }
    tracing::info!(
        files = summary.files,
        rows = summary.rows,
        skipped = summary.skipped.len(),
        "ingested CSV files"
    );
    Ok(summary)
}

/// Append the records of one CSV document to `table`. Returns the number of
/// data records read.
pub fn ingest_csv(store: &SqliteStore, content: &str, table: &str) -> StoreResult<usize> {
    let mut records = parse_csv(content).into_iter();
    let Some(header) = records.next() else {
        return Ok(0);
    };
    if header.is_empty() {
        return Ok(0);
    }
    let header = unique_columns(header);
    if header.iter().any(|h| h == "id") {
        store.create_table(table, &[("id", "TEXT")], &["id"])?;
    } else {
        store.create_table(table, &[(header[0].as_str(), "TEXT")], &[])?;
    }

    let mut count = 0;
    for record in records {
        let row: Row = header
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let cell = record.get(i).map(|v| text(v.as_str())).unwrap_or(Cell::Null);
                (name.clone(), cell)
            })
            .collect();
        store.insert_ignore(table, &row)?;
        count += 1;
    }
    Ok(count)
}

/// Number repeated header names `name_1`, `name_2`, ... so no column is
/// lost. Names compare without ASCII case, as SQLite columns do.
fn unique_columns(header: Vec<String>) -> Vec<String> {
    fn taken(columns: &[String], name: &str) -> bool {
        columns.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    let mut columns: Vec<String> = Vec::with_capacity(header.len());
    for name in header {
        if !taken(&columns, &name) {
            columns.push(name);
            continue;
        }
        let mut i = 1;
        let column = loop {
            let candidate = format!("{name}_{i}");
            if !taken(&columns, &candidate) {
                break candidate;
            }
            i += 1;
        };
        tracing::warn!(header = %name, column = %column, "duplicate CSV header renamed");
        columns.push(column);
    }
    columns
}
