//! Entity flattening: one row per entity of a type.
//!
//! Every edge of the entity is handled at a fixed decision point, in this
//! order of precedence:
//!
//! 1. text property: fetch content, or an inline `load failed: ...` marker
//! 2. expand: inline the target's own edges as `<label>_<sub-label>`
//! 3. junction: queue the edge for the `<type>_<label>` table
//! 4. ignore: drop it
//! 5. inline: `<label>` and `<label>_id`, numbered `_1`, `_2`, ... on collision
//!
//! Expansion is a single read-only level, so reference cycles in the graph
//! never matter here.

use indexmap::IndexSet;

use crate::config::TableConfig;
use crate::error::{FetchError, FlattenError, TabularResult};
use crate::extract::{EdgeSet, PropertyEdge};
use crate::fetch::ContentFetcher;
use crate::store::{Cell, Row, SqliteStore, text};

/// Key column of every entity table.
pub const ENTITY_ID: &str = "entity_id";

/// Default cap on collision suffixes (`name_1` ... `name_999`).
pub const DEFAULT_MAX_COLUMN_SUFFIX: usize = 999;

/// One edge routed to an association table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JunctionRow {
    /// `<type>_<label>`.
    pub table: String,
    /// Row id of the originating edge.
    pub sequence: u64,
    pub entity_id: String,
    pub target_id: Option<String>,
    pub value: String,
}

/// Name of the association table for `label` on `entity_type`.
pub fn junction_table(entity_type: &str, label: &str) -> String {
    format!("{entity_type}_{label}")
}

/// The flattened form of one entity.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    pub entity_id: String,
    /// Column values, `entity_id` first.
    pub data: Row,
    /// Every label seen while building, including ignored and expanded ones.
    pub props: IndexSet<String>,
    pub junctions: Vec<JunctionRow>,
}

/// Summary of one table build.
#[derive(Debug, Clone, Default)]
pub struct TableBuild {
    pub rows: usize,
    pub props: IndexSet<String>,
    pub junctions: Vec<JunctionRow>,
}

/// Builds entity rows from the edge set.
pub struct EntityFlattener<'a> {
    edges: &'a EdgeSet,
    fetcher: &'a dyn ContentFetcher,
    text_prop: Option<&'a str>,
    max_suffix: usize,
}

impl<'a> EntityFlattener<'a> {
    pub fn new(edges: &'a EdgeSet, fetcher: &'a dyn ContentFetcher, max_suffix: usize) -> Self {
        Self {
            edges,
            fetcher,
            text_prop: None,
            max_suffix,
        }
    }

    /// Label whose target is fetched and stored as text.
    pub fn with_text_prop(mut self, text_prop: Option<&'a str>) -> Self {
        self.text_prop = text_prop;
        self
    }

    /// Flatten a single entity.
    pub fn flatten(
        &self,
        entity_type: &str,
        table: &TableConfig,
        entity_id: &str,
    ) -> Result<EntityRecord, FlattenError> {
        let mut builder = RowBuilder {
            entity_type,
            entity_id,
            table,
            max_suffix: self.max_suffix,
            data: Row::new(),
            props: IndexSet::new(),
            junctions: Vec::new(),
        };
        builder
            .data
            .insert(ENTITY_ID.to_string(), text(entity_id));

        for edge in self.edges.edges_of(entity_id) {
            let name = edge.property_label.as_str();
            builder.props.insert(name.to_string());

            if self.text_prop == Some(name) {
                let content = self.fetch_text(edge);
                builder.set_numbered(name, text(content))?;
                continue;
            }
            match &edge.target_id {
                Some(target) if table.is_expanded(name) => {
                    self.expand(&mut builder, name, target)?;
                }
                _ => builder.set_property(name, edge)?,
            }
        }

        Ok(EntityRecord {
            entity_id: entity_id.to_string(),
            data: builder.data,
            props: builder.props,
            junctions: builder.junctions,
        })
    }

    fn fetch_text(&self, edge: &PropertyEdge) -> String {
        let result = match &edge.target_id {
            Some(target) => self.fetcher.fetch(target),
            None => Err(FetchError::NoTarget),
        };
        result.unwrap_or_else(|e| {
            tracing::warn!(
                entity = %edge.source_id,
                property = %edge.property_label,
                error = %e,
                "text fetch failed"
            );
            format!("load failed: {e}")
        })
    }

    /// Inline the target's edges as `<name>_<sub-label>` columns, after a
    /// `<name>_id` column holding the target id.
    fn expand(
        &self,
        builder: &mut RowBuilder<'_>,
        name: &str,
        target: &str,
    ) -> Result<(), FlattenError> {
        let id_column = format!("{name}_id");
        if !builder.table.is_ignored(&id_column) {
            builder.set_numbered(&id_column, text(target))?;
        }
        for sub in self.edges.edges_of(target) {
            let expanded = format!("{name}_{}", sub.property_label);
            builder.props.insert(expanded.clone());
            builder.set_property(&expanded, sub)?;
        }
        Ok(())
    }

    /// Rebuild the table for `entity_type` from scratch.
    ///
    /// The caller owns junction writing and `all_props` bookkeeping; this
    /// returns what they need.
    pub fn build_table(
        &self,
        store: &SqliteStore,
        entity_type: &str,
        table: &TableConfig,
    ) -> TabularResult<TableBuild> {
        store.drop_table(entity_type)?;
        let mut build = TableBuild::default();
        for entity_id in self.edges.ids_of_type(entity_type) {
            let record = self.flatten(entity_type, table, &entity_id)?;
            tracing::debug!(
                entity = %entity_id,
                columns = record.data.len(),
                junction_rows = record.junctions.len(),
                "flattened entity"
            );
            store.insert_or_replace(entity_type, &record.data, ENTITY_ID)?;
            build.props.extend(record.props);
            build.junctions.extend(record.junctions);
            build.rows += 1;
        }
        Ok(build)
    }
}

/// Mutable state while one entity's row is assembled.
struct RowBuilder<'r> {
    entity_type: &'r str,
    entity_id: &'r str,
    table: &'r TableConfig,
    max_suffix: usize,
    data: Row,
    props: IndexSet<String>,
    junctions: Vec<JunctionRow>,
}

impl RowBuilder<'_> {
    /// Junction, ignore or inline, for a direct or expanded property.
    fn set_property(&mut self, name: &str, edge: &PropertyEdge) -> Result<(), FlattenError> {
        if self.table.is_junction(name) {
            self.junctions.push(JunctionRow {
                table: junction_table(self.entity_type, name),
                sequence: edge.row_id,
                entity_id: self.entity_id.to_string(),
                target_id: edge.target_id.clone(),
                value: edge.value.clone(),
            });
            return Ok(());
        }
        if self.table.is_ignored(name) {
            return Ok(());
        }
        self.set_numbered(name, text(edge.value.as_str()))?;
        if let Some(target) = &edge.target_id {
            self.set_numbered(&format!("{name}_id"), text(target.as_str()))?;
        }
        Ok(())
    }

    /// SQLite column names ignore ASCII case.
    fn is_taken(&self, column: &str) -> bool {
        self.data.keys().any(|k| k.eq_ignore_ascii_case(column))
    }

    /// Set `name`, or the first free `name_<n>` if it is taken.
    fn set_numbered(&mut self, name: &str, value: Cell) -> Result<(), FlattenError> {
        if !self.is_taken(name) {
            self.data.insert(name.to_string(), value);
            return Ok(());
        }
        let mut i = 1;
        loop {
            let column = format!("{name}_{i}");
            if i > self.max_suffix {
                return Err(FlattenError::TooManyColumns {
                    column,
                    entity_id: self.entity_id.to_string(),
                    max: self.max_suffix,
                });
            }
            if !self.is_taken(&column) {
                self.data.insert(column, value);
                return Ok(());
            }
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TabularError;
    use crate::graph::CrateGraph;
    use serde_json::json;
    use std::collections::HashMap;

    /// Serves canned text by id.
    struct MapFetcher(HashMap<String, String>);

    impl ContentFetcher for MapFetcher {
        fn fetch(&self, locator: &str) -> Result<String, FetchError> {
            self.0.get(locator).cloned().ok_or_else(|| FetchError::Io {
                path: locator.into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "absent"),
            })
        }
    }

    fn no_text() -> MapFetcher {
        MapFetcher(HashMap::new())
    }

    fn document_graph() -> EdgeSet {
        let mut graph = CrateGraph::new();
        graph.add(
            "Document",
            "#doc",
            json!({
                "name": "Title of Document",
                "author": {"@id": "#jdoe"},
                "keywords": ["alpha", "beta", "gamma"],
                "description": "long prose",
            }),
        );
        graph.add(
            "Person",
            "#jdoe",
            json!({"name": "John Doe", "affiliation": {"@id": "#uni"}}),
        );
        graph.add("Organization", "#uni", json!({"name": "Uni"}));
        EdgeSet::from_graph(&graph)
    }

    fn column<'r>(record: &'r EntityRecord, name: &str) -> Option<&'r str> {
        match record.data.get(name) {
            Some(Cell::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    #[test]
    fn inline_relation_sets_value_and_id() {
        let edges = document_graph();
        let fetcher = no_text();
        let flattener = EntityFlattener::new(&edges, &fetcher, 10);
        let record = flattener
            .flatten("Document", &TableConfig::default(), "#doc")
            .unwrap();
        assert_eq!(column(&record, ENTITY_ID), Some("#doc"));
        assert_eq!(column(&record, "author"), Some("John Doe"));
        assert_eq!(column(&record, "author_id"), Some("#jdoe"));
    }

    #[test]
    fn repeated_scalars_are_numbered_in_order() {
        let edges = document_graph();
        let fetcher = no_text();
        let record = EntityFlattener::new(&edges, &fetcher, 10)
            .flatten("Document", &TableConfig::default(), "#doc")
            .unwrap();
        assert_eq!(column(&record, "keywords"), Some("alpha"));
        assert_eq!(column(&record, "keywords_1"), Some("beta"));
        assert_eq!(column(&record, "keywords_2"), Some("gamma"));
        let names: Vec<_> = record.data.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                "entity_id",
                "@type",
                "name",
                "author",
                "author_id",
                "keywords",
                "keywords_1",
                "keywords_2",
                "description"
            ]
        );
    }

    #[test]
    fn suffix_cap_is_fatal() {
        let edges = document_graph();
        let fetcher = no_text();
        let err = EntityFlattener::new(&edges, &fetcher, 1)
            .flatten("Document", &TableConfig::default(), "#doc")
            .unwrap_err();
        match err {
            FlattenError::TooManyColumns { column, max, .. } => {
                assert_eq!(column, "keywords_2");
                assert_eq!(max, 1);
            }
        }
    }

    #[test]
    fn expand_inlines_target_properties() {
        let edges = document_graph();
        let fetcher = no_text();
        let table = TableConfig {
            expand_props: vec!["author".into()],
            ..Default::default()
        };
        let record = EntityFlattener::new(&edges, &fetcher, 10)
            .flatten("Document", &table, "#doc")
            .unwrap();
        assert_eq!(column(&record, "author_id"), Some("#jdoe"));
        assert_eq!(column(&record, "author_name"), Some("John Doe"));
        assert_eq!(column(&record, "author_affiliation"), Some("Uni"));
        assert_eq!(column(&record, "author_affiliation_id"), Some("#uni"));
        // expansion stops after one level
        assert!(!record.data.contains_key("author_affiliation_name"));
        assert!(record.props.contains("author_name"));
        assert!(record.props.contains("author"));
    }

    #[test]
    fn expanded_id_column_can_be_ignored() {
        let edges = document_graph();
        let fetcher = no_text();
        let table = TableConfig {
            expand_props: vec!["author".into()],
            ignore_props: vec!["author_id".into()],
            ..Default::default()
        };
        let record = EntityFlattener::new(&edges, &fetcher, 10)
            .flatten("Document", &table, "#doc")
            .unwrap();
        assert!(!record.data.contains_key("author_id"));
        assert_eq!(column(&record, "author_name"), Some("John Doe"));
    }

    #[test]
    fn labels_differing_only_in_case_are_numbered() {
        let mut graph = CrateGraph::new();
        graph.add("Thing", "#t", json!({"name": "x", "Name": "y", "NAME": "z"}));
        let edges = EdgeSet::from_graph(&graph);
        let fetcher = no_text();
        let flattener = EntityFlattener::new(&edges, &fetcher, 10);
        let record = flattener
            .flatten("Thing", &TableConfig::default(), "#t")
            .unwrap();
        assert_eq!(column(&record, "name"), Some("x"));
        assert_eq!(column(&record, "Name_1"), Some("y"));
        assert_eq!(column(&record, "NAME_2"), Some("z"));

        let store = SqliteStore::in_memory().unwrap();
        flattener
            .build_table(&store, "Thing", &TableConfig::default())
            .unwrap();
        let result = store.query("SELECT * FROM Thing", &[]).unwrap();
        assert_eq!(result.texts("Name_1"), vec!["y"]);
    }

    #[test]
    fn ignore_applies_to_direct_and_expanded_names() {
        let edges = document_graph();
        let fetcher = no_text();
        let table = TableConfig {
            expand_props: vec!["author".into()],
            ignore_props: vec!["description".into(), "author_affiliation".into()],
            ..Default::default()
        };
        let record = EntityFlattener::new(&edges, &fetcher, 10)
            .flatten("Document", &table, "#doc")
            .unwrap();
        assert!(!record.data.contains_key("description"));
        assert!(!record.data.contains_key("author_affiliation"));
        assert!(!record.data.contains_key("author_affiliation_id"));
        assert!(record.props.contains("description"));
    }

    #[test]
    fn junction_labels_are_queued_not_inlined() {
        let edges = document_graph();
        let fetcher = no_text();
        let table = TableConfig {
            junctions: vec!["keywords".into()],
            ..Default::default()
        };
        let record = EntityFlattener::new(&edges, &fetcher, 10)
            .flatten("Document", &table, "#doc")
            .unwrap();
        assert!(!record.data.contains_key("keywords"));
        let values: Vec<_> = record.junctions.iter().map(|j| j.value.as_str()).collect();
        assert_eq!(values, vec!["alpha", "beta", "gamma"]);
        assert!(record.junctions.iter().all(|j| j.table == "Document_keywords"));
        assert!(record.junctions.windows(2).all(|w| w[0].sequence < w[1].sequence));
    }

    #[test]
    fn junction_wins_over_ignore() {
        let edges = document_graph();
        let fetcher = no_text();
        let table = TableConfig {
            junctions: vec!["keywords".into()],
            ignore_props: vec!["keywords".into()],
            ..Default::default()
        };
        let record = EntityFlattener::new(&edges, &fetcher, 10)
            .flatten("Document", &table, "#doc")
            .unwrap();
        assert_eq!(record.junctions.len(), 3);
    }

    #[test]
    fn text_property_fetches_or_marks_failure() {
        let mut graph = CrateGraph::new();
        graph.add(
            "Document",
            "#doc",
            json!({"transcript": [{"@id": "a.txt"}, {"@id": "missing.txt"}]}),
        );
        let edges = EdgeSet::from_graph(&graph);
        let fetcher = MapFetcher(HashMap::from([("a.txt".to_string(), "full text".to_string())]));
        let record = EntityFlattener::new(&edges, &fetcher, 10)
            .with_text_prop(Some("transcript"))
            .flatten("Document", &TableConfig::default(), "#doc")
            .unwrap();
        assert_eq!(column(&record, "transcript"), Some("full text"));
        assert!(column(&record, "transcript_1").unwrap().starts_with("load failed:"));
        assert!(!record.data.contains_key("transcript_id"));
    }

    #[test]
    fn build_table_writes_one_row_per_entity() {
        let edges = document_graph();
        let fetcher = no_text();
        let store = SqliteStore::in_memory().unwrap();
        let build = EntityFlattener::new(&edges, &fetcher, 10)
            .build_table(&store, "Document", &TableConfig::default())
            .unwrap();
        assert_eq!(build.rows, 1);
        assert!(build.props.contains("keywords"));
        let result = store.query("SELECT entity_id, author_id FROM Document", &[]).unwrap();
        assert_eq!(result.texts("author_id"), vec!["#jdoe"]);
    }

    #[test]
    fn build_table_propagates_too_many_columns() {
        let edges = document_graph();
        let fetcher = no_text();
        let store = SqliteStore::in_memory().unwrap();
        let err = EntityFlattener::new(&edges, &fetcher, 0)
            .build_table(&store, "Document", &TableConfig::default())
            .unwrap_err();
        assert!(matches!(err, TabularError::Flatten(_)));
    }
}
