//! Table planning: decide which properties of a type are too wide to inline.
//!
//! A property whose per-entity count exceeds the junction threshold on any
//! entity of the type would otherwise need that many numbered columns, so it
//! is routed to a `<type>_<label>` association table instead.

use indexmap::IndexMap;

use crate::config::FlattenConfig;
use crate::error::ConfigError;
use crate::extract::EdgeSet;

/// Default junction threshold: more values than this on one entity forces
/// a junction table.
pub const DEFAULT_JUNCTION_THRESHOLD: usize = 10;

/// Computes property cardinalities for one type over the extracted edges.
#[derive(Debug, Clone, Copy)]
pub struct TablePlanner<'a> {
    edges: &'a EdgeSet,
    threshold: usize,
}

impl<'a> TablePlanner<'a> {
    pub fn new(edges: &'a EdgeSet, threshold: usize) -> Self {
        Self { edges, threshold }
    }

    /// Maximum number of values any single entity of `entity_type` has for
    /// each label, in first-seen label order.
    pub fn max_counts(&self, entity_type: &str) -> IndexMap<String, usize> {
        let mut prop_max: IndexMap<String, usize> = IndexMap::new();
        for entity_id in self.edges.ids_of_type(entity_type) {
            let mut prop_count: IndexMap<&str, usize> = IndexMap::new();
            for edge in self.edges.edges_of(&entity_id) {
                *prop_count.entry(edge.property_label.as_str()).or_default() += 1;
            }
            for (label, count) in prop_count {
                let max = prop_max.entry(label.to_string()).or_default();
                *max = (*max).max(count);
            }
        }
        prop_max
    }

    /// Add every over-threshold label of `entity_type` to its junction list.
    ///
    /// Membership is additive: labels already listed stay listed even if the
    /// current data no longer exceeds the threshold. Returns the labels added
    /// by this pass.
    pub fn plan(
        &self,
        config: &mut FlattenConfig,
        entity_type: &str,
    ) -> Result<Vec<String>, ConfigError> {
        let table = config.table_mut(entity_type)?;
        let mut added = Vec::new();
        for (label, count) in self.max_counts(entity_type) {
            if count > self.threshold && table.add_junction(&label) {
                tracing::info!(
                    table = entity_type,
                    property = %label,
                    count,
                    threshold = self.threshold,
                    "routing property to junction table"
                );
                added.push(label);
            }
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfig;
    use crate::graph::CrateGraph;
    use serde_json::{Value, json};

    fn wide(parts: usize) -> EdgeSet {
        let mut graph = CrateGraph::new();
        let has_part: Vec<Value> = (0..parts)
            .map(|i| json!({"@id": format!("{i:04}.txt")}))
            .collect();
        graph.add("Dataset", "./", json!({"name": "Wide", "hasPart": has_part}));
        graph.add("Dataset", "#small", json!({"name": "Small", "hasPart": [{"@id": "0000.txt"}]}));
        EdgeSet::from_graph(&graph)
    }

    fn configured() -> FlattenConfig {
        let mut config = FlattenConfig::default();
        config.tables.insert("Dataset".into(), TableConfig::default());
        config
    }

    #[test]
    fn max_counts_take_the_widest_entity() {
        let edges = wide(25);
        let counts = TablePlanner::new(&edges, 10).max_counts("Dataset");
        assert_eq!(counts["hasPart"], 25);
        assert_eq!(counts["name"], 1);
        assert_eq!(counts["@type"], 1);
    }

    #[test]
    fn over_threshold_becomes_junction() {
        let edges = wide(2000);
        let mut config = configured();
        let added = TablePlanner::new(&edges, 10).plan(&mut config, "Dataset").unwrap();
        assert_eq!(added, vec!["hasPart"]);
        assert_eq!(config.tables["Dataset"].junctions, vec!["hasPart"]);
    }

    #[test]
    fn at_threshold_stays_inline() {
        let edges = wide(10);
        let mut config = configured();
        let added = TablePlanner::new(&edges, 10).plan(&mut config, "Dataset").unwrap();
        assert!(added.is_empty());
        assert!(config.tables["Dataset"].junctions.is_empty());
    }

    #[test]
    fn junctions_are_never_revoked() {
        let mut config = configured();
        let wide_edges = wide(50);
        TablePlanner::new(&wide_edges, 10)
            .plan(&mut config, "Dataset")
            .unwrap();

        // a later pass over narrower data keeps the earlier decision
        let narrow_edges = wide(3);
        let added = TablePlanner::new(&narrow_edges, 10)
            .plan(&mut config, "Dataset")
            .unwrap();
        assert!(added.is_empty());
        assert_eq!(config.tables["Dataset"].junctions, vec!["hasPart"]);

        // and a repeat pass does not duplicate it
        TablePlanner::new(&wide_edges, 10)
            .plan(&mut config, "Dataset")
            .unwrap();
        assert_eq!(config.tables["Dataset"].junctions, vec!["hasPart"]);
    }

    #[test]
    fn unconfigured_type_is_an_error() {
        let edges = wide(1);
        let mut config = FlattenConfig::default();
        config
            .potential_tables
            .insert("Dataset".into(), TableConfig::default());
        let err = TablePlanner::new(&edges, 10)
            .plan(&mut config, "Dataset")
            .unwrap_err();
        assert!(matches!(err, ConfigError::TableNotConfigured { .. }));
    }
}
