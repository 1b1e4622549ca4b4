//! Property extraction: flatten every entity of a graph into an ordered
//! sequence of [`PropertyEdge`]s.
//!
//! The edge list is the single source of truth for everything downstream.
//! Planning, flattening and expansion all read it, none of them write it.

use std::collections::HashMap;

use indexmap::IndexSet;
use serde_json::{Map, Value};

use crate::graph::{CrateGraph, as_list, as_reference, scalar_string};

/// Label carrying an entity's type tags.
pub const TYPE_LABEL: &str = "@type";

/// One flattened `(entity, label, value-or-reference)` fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyEdge {
    /// Position in extraction order, starting at 0.
    pub row_id: u64,
    pub source_id: String,
    pub source_name: String,
    pub property_label: String,
    /// Set when the value was a reference to another entity.
    pub target_id: Option<String>,
    /// Scalar value, or the target's display name for references.
    pub value: String,
}

/// Walk the graph once and emit one edge per `(label, value)` pair.
///
/// Entities without an `@id` produce no edges.
pub fn extract(graph: &CrateGraph) -> Vec<PropertyEdge> {
    let mut edges = Vec::new();
    let mut seq = 0u64;
    for entity in graph.entities() {
        let Some(source_id) = entity.id() else {
            continue;
        };
        let source_name = entity.name();
        for (label, value) in entity.props() {
            for v in as_list(Some(value)) {
                let (target_id, value) = match as_reference(v) {
                    Some(tid) => {
                        let target_name = graph.get(tid).map(|t| t.name()).unwrap_or_default();
                        (Some(tid.to_string()), target_name)
                    }
                    None => (None, scalar_string(v)),
                };
                edges.push(PropertyEdge {
                    row_id: seq,
                    source_id: source_id.to_string(),
                    source_name: source_name.clone(),
                    property_label: label.clone(),
                    target_id,
                    value,
                });
                seq += 1;
            }
        }
    }
    edges
}

/// Rebuild an entity's property map from its edges.
///
/// References come back as `{"@id": target}`; a label seen once maps to its
/// value, a repeated label maps to an array in edge order.
pub fn reconstruct<'a>(
    id: &str,
    edges: impl IntoIterator<Item = &'a PropertyEdge>,
) -> Map<String, Value> {
    let mut grouped: Map<String, Value> = Map::new();
    grouped.insert("@id".into(), Value::String(id.to_string()));
    for edge in edges.into_iter().filter(|e| e.source_id == id) {
        let value = match &edge.target_id {
            Some(tid) => {
                let mut reference = Map::new();
                reference.insert("@id".into(), Value::String(tid.clone()));
                Value::Object(reference)
            }
            None => Value::String(edge.value.clone()),
        };
        match grouped.get_mut(&edge.property_label) {
            None => {
                grouped.insert(edge.property_label.clone(), value);
            }
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    grouped
}

/// The extracted edges plus lookup indexes over them.
#[derive(Debug, Clone, Default)]
pub struct EdgeSet {
    edges: Vec<PropertyEdge>,
    by_source: HashMap<String, Vec<usize>>,
}

impl EdgeSet {
    pub fn new(edges: Vec<PropertyEdge>) -> Self {
        let mut by_source: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, edge) in edges.iter().enumerate() {
            by_source.entry(edge.source_id.clone()).or_default().push(i);
        }
        Self { edges, by_source }
    }

    pub fn from_graph(graph: &CrateGraph) -> Self {
        Self::new(extract(graph))
    }

    pub fn all(&self) -> &[PropertyEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Edges of one entity, in extraction order.
    pub fn edges_of<'a>(&'a self, source_id: &str) -> impl Iterator<Item = &'a PropertyEdge> + 'a {
        self.by_source
            .get(source_id)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
    }

    /// Ids of entities tagged with `entity_type`, first-seen order.
    pub fn ids_of_type(&self, entity_type: &str) -> IndexSet<String> {
        self.edges
            .iter()
            .filter(|e| e.property_label == TYPE_LABEL && e.value == entity_type)
            .map(|e| e.source_id.clone())
            .collect()
    }

    /// Distinct type tags across the graph, first-seen order.
    pub fn types(&self) -> IndexSet<String> {
        self.edges
            .iter()
            .filter(|e| e.property_label == TYPE_LABEL && e.target_id.is_none())
            .map(|e| e.value.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> CrateGraph {
        let mut graph = CrateGraph::new();
        graph.add(
            "Document",
            "#doc",
            json!({
                "name": "Title of Document",
                "author": [{"@id": "#jdoe"}, {"@id": "#missing"}],
                "keywords": ["a", "b"],
            }),
        );
        graph.add("Person", "#jdoe", json!({"name": "John Doe"}));
        graph
    }

    #[test]
    fn edges_follow_graph_order() {
        let edges = extract(&sample());
        let labels: Vec<_> = edges.iter().map(|e| e.property_label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["@type", "name", "author", "author", "keywords", "keywords", "@type", "name"]
        );
        assert!(edges.iter().enumerate().all(|(i, e)| e.row_id == i as u64));
    }

    #[test]
    fn relation_edges_carry_target_name() {
        let edges = extract(&sample());
        let authors: Vec<_> = edges
            .iter()
            .filter(|e| e.property_label == "author")
            .collect();
        assert_eq!(authors[0].target_id.as_deref(), Some("#jdoe"));
        assert_eq!(authors[0].value, "John Doe");
        // unresolved target keeps the id but has an empty name
        assert_eq!(authors[1].target_id.as_deref(), Some("#missing"));
        assert_eq!(authors[1].value, "");
        assert_eq!(authors[0].source_name, "Title of Document");
    }

    #[test]
    fn entities_without_id_are_skipped() {
        let doc = json!({
            "@context": {},
            "@graph": [
                {"@type": "Thing", "name": "no id"},
                {"@id": "#x", "name": "has id"},
            ]
        });
        let graph = CrateGraph::from_value(doc).unwrap();
        let edges = extract(&graph);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source_id, "#x");
    }

    #[test]
    fn nested_values_are_json_text() {
        let mut graph = CrateGraph::new();
        graph.add("Thing", "#t", json!({"extent": {"value": 3, "unit": "m"}, "count": 7}));
        let edges = extract(&graph);
        assert_eq!(edges[1].value, r#"{"value":3,"unit":"m"}"#);
        assert_eq!(edges[2].value, "7");
        let parsed: Value = serde_json::from_str(&edges[1].value).unwrap();
        assert_eq!(parsed["unit"], "m");
    }

    #[test]
    fn edge_set_indexes_types_and_sources() {
        let set = EdgeSet::from_graph(&sample());
        assert_eq!(set.ids_of_type("Document").into_iter().collect::<Vec<_>>(), vec!["#doc"]);
        assert_eq!(set.types().into_iter().collect::<Vec<_>>(), vec!["Document", "Person"]);
        assert_eq!(set.edges_of("#jdoe").count(), 2);
        assert_eq!(set.edges_of("#nobody").count(), 0);
    }

    #[test]
    fn reconstruct_restores_references() {
        let graph = sample();
        let set = EdgeSet::from_graph(&graph);
        let rebuilt = reconstruct("#doc", set.all());
        assert_eq!(Value::Object(rebuilt), graph.get("#doc").unwrap().to_value());
    }
}
