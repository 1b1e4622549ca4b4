//! CSV export of configured queries, with an RO-Crate sidecar describing the
//! exported files and their columns.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::{Value, json};

use crate::context::TermResolver;
use crate::delimited::{CsvWriter, escape_line_breaks};
use crate::error::{ExportError, TabularResult};
use crate::flatten::ENTITY_ID;
use crate::graph::{CrateGraph, METADATA_FILE};
use crate::store::{Cell, SqliteStore};

/// One CSV written by [`Exporter::export_csv`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    /// Output name, also the file name inside the output directory.
    pub name: String,
    pub path: PathBuf,
    pub columns: Vec<String>,
    pub rows: usize,
}

/// Runs export queries against a store.
pub struct Exporter<'a> {
    store: &'a SqliteStore,
    resolver: &'a dyn TermResolver,
    context: Value,
}

impl<'a> Exporter<'a> {
    /// `context` is copied into the sidecar; `resolver` maps column base
    /// names to property IRIs.
    pub fn new(store: &'a SqliteStore, context: Value, resolver: &'a dyn TermResolver) -> Self {
        Self {
            store,
            resolver,
            context,
        }
    }

    /// Write one CSV per query, then `ro-crate-metadata.json`, into `out_dir`.
    pub fn export_csv(
        &self,
        queries: &IndexMap<String, String>,
        out_dir: &Path,
    ) -> TabularResult<Vec<ExportedFile>> {
        std::fs::create_dir_all(out_dir).map_err(|e| io_error(out_dir, e))?;
        let mut files = Vec::with_capacity(queries.len());
        for (name, sql) in queries {
            let file = self.write_query(name, sql, &out_dir.join(name))?;
            tracing::info!(file = %file.path.display(), rows = file.rows, "exported query");
            files.push(file);
        }

        let sidecar = self.sidecar(&files);
        let text = serde_json::to_string_pretty(&sidecar.to_value()).map_err(|e| {
            ExportError::Serialize {
                message: e.to_string(),
            }
        })?;
        let path = out_dir.join(METADATA_FILE);
        std::fs::write(&path, text).map_err(|e| io_error(&path, e))?;
        Ok(files)
    }

    fn write_query(&self, name: &str, sql: &str, path: &Path) -> TabularResult<ExportedFile> {
        let result = self.store.query(sql, &[])?;
        let file = File::create(path).map_err(|e| io_error(path, e))?;
        let mut writer = CsvWriter::new(BufWriter::new(file));
        writer
            .write_record(&result.columns)
            .map_err(|e| io_error(path, e))?;
        for row in &result.rows {
            writer
                .write_record(
                    result
                        .columns
                        .iter()
                        .map(|c| row.get(c).map(cell_text).unwrap_or_default()),
                )
                .map_err(|e| io_error(path, e))?;
        }
        writer.flush().map_err(|e| io_error(path, e))?;
        Ok(ExportedFile {
            name: name.to_string(),
            path: path.to_path_buf(),
            columns: result.columns.clone(),
            rows: result.len(),
        })
    }

    /// RO-Crate metadata describing the exported files.
    pub fn sidecar(&self, files: &[ExportedFile]) -> CrateGraph {
        let mut graph = CrateGraph::new().with_context(self.context.clone());
        graph.add(
            "CreativeWork",
            METADATA_FILE,
            json!({
                "about": {"@id": "./"},
                "conformsTo": {"@id": "https://w3id.org/ro/crate/1.1"},
            }),
        );
        let parts: Vec<Value> = files.iter().map(|f| json!({"@id": f.name})).collect();
        graph.add(
            "Dataset",
            "./",
            json!({
                "name": "Tabular export",
                "description": "CSV files exported from an RO-Crate",
                "hasPart": parts,
            }),
        );

        for file in files {
            let column_ids: Vec<Value> = file
                .columns
                .iter()
                .map(|c| json!({"@id": column_id(&file.name, c)}))
                .collect();
            graph.add(
                "File",
                &file.name,
                json!({
                    "name": file.name,
                    "encodingFormat": "text/csv",
                    "variableMeasured": column_ids,
                }),
            );
        }
        for file in files {
            for column in &file.columns {
                let mut props = json!({ "name": column });
                if let Some(iri) = self.column_iri(column) {
                    props["propertyID"] = Value::String(iri);
                }
                graph.add("PropertyValue", &column_id(&file.name, column), props);
            }
        }
        graph
    }

    /// IRI of the property a column was built from, if it resolves.
    fn column_iri(&self, column: &str) -> Option<String> {
        if column == ENTITY_ID {
            return None;
        }
        let base = base_property(column);
        if let Some(iri) = self.resolver.resolve_iri(base) {
            return Some(iri);
        }
        // expanded columns are `<label>_<sub-label>`
        base.match_indices('_')
            .find_map(|(i, _)| self.resolver.resolve_iri(&base[i + 1..]))
    }
}

fn column_id(file: &str, column: &str) -> String {
    format!("#{file}/{column}")
}

fn io_error(path: &Path, source: std::io::Error) -> ExportError {
    ExportError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Render a cell as a single-line CSV field.
fn cell_text(cell: &Cell) -> String {
    match cell {
        Cell::Null => String::new(),
        Cell::Integer(i) => i.to_string(),
        Cell::Real(r) => r.to_string(),
        Cell::Text(s) => escape_line_breaks(s),
        Cell::Blob(b) => escape_line_breaks(&String::from_utf8_lossy(b)),
    }
}

/// The property label a column was named after: numeric `_<n>` and then
/// `_id` suffixes removed (`author_id_2` -> `author`).
pub fn base_property(column: &str) -> &str {
    let base = match column.rsplit_once('_') {
        Some((head, tail))
            if !head.is_empty() && !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) =>
        {
            head
        }
        _ => column,
    };
    match base.strip_suffix("_id") {
        Some(head) if !head.is_empty() => head,
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextResolver, StaticLoader};
    use crate::store::{Row, text};
    use tempfile::TempDir;

    fn resolver() -> ContextResolver {
        let context = json!({
            "name": "http://schema.org/name",
            "author": "http://schema.org/author",
            "keywords": "http://schema.org/keywords",
        });
        ContextResolver::new(&context, &StaticLoader::new()).unwrap()
    }

    fn people_store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        let mut row = Row::new();
        row.insert("entity_id".into(), text("#p1"));
        row.insert("name".into(), text("Line one\nline two\r\nend"));
        row.insert("author_id".into(), text("#a"));
        store.insert_or_replace("Person", &row, "entity_id").unwrap();
        let mut row = Row::new();
        row.insert("entity_id".into(), text("#p2"));
        row.insert("name".into(), text("Doe, \"JD\""));
        store.insert_or_replace("Person", &row, "entity_id").unwrap();
        store
    }

    fn queries(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn base_property_strips_suffixes() {
        assert_eq!(base_property("keywords_3"), "keywords");
        assert_eq!(base_property("author_id"), "author");
        assert_eq!(base_property("author_id_1"), "author");
        assert_eq!(base_property("author_name"), "author_name");
        assert_eq!(base_property("_id"), "_id");
        assert_eq!(base_property("name"), "name");
    }

    #[test]
    fn writes_escaped_single_line_rows() {
        let dir = TempDir::new().unwrap();
        let store = people_store();
        let resolver = resolver();
        let exporter = Exporter::new(&store, json!({}), &resolver);
        let files = exporter
            .export_csv(
                &queries(&[("people.csv", "SELECT * FROM Person ORDER BY entity_id")]),
                dir.path(),
            )
            .unwrap();
        assert_eq!(files[0].rows, 2);

        let text = std::fs::read_to_string(dir.path().join("people.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "entity_id,name,author_id");
        assert_eq!(lines[1], "#p1,Line one\\nline two\\r\\nend,#a");
        assert_eq!(lines[2], "#p2,\"Doe, \"\"JD\"\"\",");
    }

    #[test]
    fn empty_result_still_has_header() {
        let dir = TempDir::new().unwrap();
        let store = people_store();
        let resolver = resolver();
        Exporter::new(&store, json!({}), &resolver)
            .export_csv(
                &queries(&[("none.csv", "SELECT entity_id, name FROM Person WHERE 0")]),
                dir.path(),
            )
            .unwrap();
        let text = std::fs::read_to_string(dir.path().join("none.csv")).unwrap();
        assert_eq!(text, "entity_id,name\n");
    }

    #[test]
    fn bad_query_is_a_store_error() {
        let dir = TempDir::new().unwrap();
        let store = people_store();
        let resolver = resolver();
        let err = Exporter::new(&store, json!({}), &resolver)
            .export_csv(&queries(&[("x.csv", "SELECT * FROM Missing")]), dir.path())
            .unwrap_err();
        assert!(matches!(err, crate::error::TabularError::Store(_)));
    }

    #[test]
    fn sidecar_describes_files_and_columns() {
        let dir = TempDir::new().unwrap();
        let store = people_store();
        let resolver = resolver();
        let context = json!({"name": "http://schema.org/name"});
        Exporter::new(&store, context.clone(), &resolver)
            .export_csv(
                &queries(&[("people.csv", "SELECT entity_id, name, author_id FROM Person")]),
                dir.path(),
            )
            .unwrap();

        let text = std::fs::read_to_string(dir.path().join(METADATA_FILE)).unwrap();
        let sidecar = CrateGraph::from_value(serde_json::from_str(&text).unwrap()).unwrap();
        assert_eq!(sidecar.context(), &context);
        assert_eq!(sidecar.root().unwrap().id(), Some("./"));
        assert!(sidecar.get("people.csv").is_some());

        let name = sidecar.get("#people.csv/name").unwrap();
        assert_eq!(name.get("propertyID"), Some(&json!("http://schema.org/name")));
        let author = sidecar.get("#people.csv/author_id").unwrap();
        assert_eq!(author.get("propertyID"), Some(&json!("http://schema.org/author")));
        let id = sidecar.get("#people.csv/entity_id").unwrap();
        assert_eq!(id.get("propertyID"), None);
    }

    #[test]
    fn expanded_columns_fall_back_to_sub_label() {
        let store = SqliteStore::in_memory().unwrap();
        let resolver = resolver();
        let exporter = Exporter::new(&store, json!({}), &resolver);
        assert_eq!(
            exporter.column_iri("creator_name_2").as_deref(),
            Some("http://schema.org/name")
        );
        assert_eq!(exporter.column_iri("mystery"), None);
    }
}
