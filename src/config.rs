//! Flattening configuration: per-type table policy and export queries.
//!
//! The document is JSON by default (pretty printed with a 4-space indent),
//! or TOML when the file name ends in `.toml`. Maps keep their insertion
//! order so a load/save cycle does not reshuffle a hand-edited file.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::extract::EdgeSet;

/// Flattening policy for one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Every property label ever observed on entities of this type.
    #[serde(default)]
    pub all_props: Vec<String>,
    /// Labels dropped from the table.
    #[serde(default)]
    pub ignore_props: Vec<String>,
    /// Reference labels whose target is inlined as `<label>_<sub-label>`.
    #[serde(default)]
    pub expand_props: Vec<String>,
    /// Labels routed to `<type>_<label>` association tables.
    #[serde(default)]
    pub junctions: Vec<String>,
}

impl TableConfig {
    pub fn is_ignored(&self, label: &str) -> bool {
        self.ignore_props.iter().any(|p| p == label)
    }

    pub fn is_expanded(&self, label: &str) -> bool {
        self.expand_props.iter().any(|p| p == label)
    }

    pub fn is_junction(&self, label: &str) -> bool {
        self.junctions.iter().any(|p| p == label)
    }

    /// Add `label` to the junction list. Returns false if already present.
    pub fn add_junction(&mut self, label: &str) -> bool {
        if self.is_junction(label) {
            return false;
        }
        self.junctions.push(label.to_string());
        true
    }

    /// Merge newly discovered labels into `all_props`, keeping first-seen order.
    pub fn merge_props<'a>(&mut self, labels: impl IntoIterator<Item = &'a String>) {
        for label in labels {
            if !self.all_props.contains(label) {
                self.all_props.push(label.clone());
            }
        }
    }
}

/// The whole configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenConfig {
    /// Output file name → SQL query.
    #[serde(default)]
    pub export_queries: IndexMap<String, String>,
    /// Types that get an entity table.
    #[serde(default)]
    pub tables: IndexMap<String, TableConfig>,
    /// Types seen in the crate but not yet promoted to `tables`.
    #[serde(default)]
    pub potential_tables: IndexMap<String, TableConfig>,
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "toml")
}

impl FlattenConfig {
    /// A default document with one potential table per observed type.
    pub fn infer(edges: &EdgeSet) -> Self {
        let mut config = Self::default();
        for entity_type in edges.types() {
            config
                .potential_tables
                .insert(entity_type, TableConfig::default());
        }
        tracing::info!(
            types = config.potential_tables.len(),
            "inferred default configuration"
        );
        config
    }

    /// Move a potential table into `tables`. Returns false if there was none.
    pub fn promote(&mut self, entity_type: &str) -> bool {
        match self.potential_tables.shift_remove(entity_type) {
            Some(table) => {
                self.tables.insert(entity_type.to_string(), table);
                true
            }
            None => false,
        }
    }

    /// Promote every potential table.
    pub fn promote_all(&mut self) {
        let types: Vec<String> = self.potential_tables.keys().cloned().collect();
        for t in types {
            self.promote(&t);
        }
    }

    pub fn table(&self, entity_type: &str) -> Result<&TableConfig, ConfigError> {
        self.tables
            .get(entity_type)
            .ok_or_else(|| ConfigError::TableNotConfigured {
                table: entity_type.to_string(),
            })
    }

    pub fn table_mut(&mut self, entity_type: &str) -> Result<&mut TableConfig, ConfigError> {
        self.tables
            .get_mut(entity_type)
            .ok_or_else(|| ConfigError::TableNotConfigured {
                table: entity_type.to_string(),
            })
    }

    /// Load from a JSON (or `.toml`) file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let parsed = if is_toml(path) {
            toml::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        };
        parsed.map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })
    }

    /// Save to a JSON (or `.toml`) file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = if is_toml(path) {
            toml::to_string_pretty(self).map_err(|e| e.to_string())
        } else {
            self.to_json_pretty().map_err(|e| e.to_string())
        }
        .map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    fn to_json_pretty(&self) -> serde_json::Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        // serde_json only ever emits valid UTF-8
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
