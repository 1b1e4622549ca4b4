//! RO-Crate graph: the parsed `@graph` of a crate metadata document.
//!
//! Entities live in an arena (`Vec<Entity>`) indexed by their `@id`, so
//! references between entities are plain string ids and cycles cost nothing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};

use crate::error::LoadError;

/// File name of the metadata document inside a crate directory.
pub const METADATA_FILE: &str = "ro-crate-metadata.json";

/// Default RO-Crate 1.1 context used by [`CrateGraph::new`].
pub const ROCRATE_CONTEXT: &str = "https://w3id.org/ro/crate/1.1/context";

/// Where a crate's metadata comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrateSource {
    /// A crate directory holding `ro-crate-metadata.json`.
    Directory(PathBuf),
    /// A metadata JSON file given directly.
    File(PathBuf),
    /// An HTTP(S) location returning the metadata document.
    Url(String),
}

impl CrateSource {
    /// Interpret a command-line argument as a crate location.
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            return CrateSource::Url(location.to_string());
        }
        let path = PathBuf::from(location);
        if path.is_file() {
            CrateSource::File(path)
        } else {
            CrateSource::Directory(path)
        }
    }

    /// Directory that relative entity ids resolve against, if local.
    pub fn base_dir(&self) -> Option<&Path> {
        match self {
            CrateSource::Directory(dir) => Some(dir),
            CrateSource::File(file) => file.parent(),
            CrateSource::Url(_) => None,
        }
    }

    /// Read and parse the metadata document.
    pub fn load(&self) -> Result<CrateGraph, LoadError> {
        let document = match self {
            CrateSource::Directory(dir) => read_json(&dir.join(METADATA_FILE))?,
            CrateSource::File(file) => read_json(file)?,
            CrateSource::Url(url) => {
                tracing::info!(url = %url, "fetching crate metadata");
                let response = ureq::get(url).call().map_err(|e| LoadError::Http {
                    url: url.clone(),
                    message: e.to_string(),
                })?;
                response
                    .into_json::<Value>()
                    .map_err(|e| LoadError::Parse {
                        message: e.to_string(),
                    })?
            }
        };
        CrateGraph::from_value(document)
    }
}

impl std::fmt::Display for CrateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrateSource::Directory(p) | CrateSource::File(p) => write!(f, "{}", p.display()),
            CrateSource::Url(u) => write!(f, "{u}"),
        }
    }
}

fn read_json(path: &Path) -> Result<Value, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| LoadError::Parse {
        message: e.to_string(),
    })
}

/// One node of the graph.
///
/// `props` holds every key of the JSON object except `@id`, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    id: Option<String>,
    props: Map<String, Value>,
}

impl Entity {
    pub fn from_object(mut object: Map<String, Value>) -> Self {
        let id = match object.shift_remove("@id") {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };
        Self { id, props: object }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn props(&self) -> &Map<String, Value> {
        &self.props
    }

    pub fn get(&self, label: &str) -> Option<&Value> {
        self.props.get(label)
    }

    /// The entity's type tags (`@type` as a string or array of strings).
    pub fn types(&self) -> Vec<&str> {
        as_list(self.props.get("@type"))
            .filter_map(Value::as_str)
            .collect()
    }

    /// Display name: the first `name` value in string form, or empty.
    pub fn name(&self) -> String {
        as_list(self.props.get("name"))
            .next()
            .map(scalar_string)
            .unwrap_or_default()
    }

    /// Mutable access for builders.
    pub fn props_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.props
    }

    /// The entity as a JSON-LD object, `@id` first.
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        if let Some(id) = &self.id {
            object.insert("@id".into(), Value::String(id.clone()));
        }
        for (k, v) in &self.props {
            object.insert(k.clone(), v.clone());
        }
        Value::Object(object)
    }
}

/// Iterate a property value in list form: null is empty, arrays yield
/// their elements and anything else yields itself.
pub fn as_list(value: Option<&Value>) -> Box<dyn Iterator<Item = &Value> + '_> {
    match value {
        None | Some(Value::Null) => Box::new(std::iter::empty()),
        Some(Value::Array(items)) => Box::new(items.iter()),
        Some(other) => Box::new(std::iter::once(other)),
    }
}

/// If `value` is a reference (`{"@id": ...}`), return the target id.
pub fn as_reference(value: &Value) -> Option<&str> {
    value.as_object()?.get("@id")?.as_str()
}

/// Stable string form of a non-reference value.
///
/// Strings are kept verbatim; everything else is compact JSON, so nested
/// objects and arrays can be parsed again later.
pub fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The parsed `@graph` plus its `@context`.
#[derive(Debug, Clone)]
pub struct CrateGraph {
    context: Value,
    entities: Vec<Entity>,
    index: HashMap<String, usize>,
}

impl Default for CrateGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl CrateGraph {
    /// An empty graph with the RO-Crate 1.1 context.
    pub fn new() -> Self {
        Self {
            context: Value::String(ROCRATE_CONTEXT.into()),
            entities: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Replace the `@context`.
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// Build a graph from a parsed metadata document.
    pub fn from_value(document: Value) -> Result<Self, LoadError> {
        let Value::Object(mut document) = document else {
            return Err(LoadError::Parse {
                message: "top level is not a JSON object".into(),
            });
        };
        let context = document.shift_remove("@context").ok_or_else(|| LoadError::Shape {
            key: "@context".into(),
        })?;
        let graph = match document.shift_remove("@graph") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(LoadError::Shape {
                    key: "@graph".into(),
                });
            }
        };

        let mut crate_graph = Self {
            context,
            entities: Vec::with_capacity(graph.len()),
            index: HashMap::new(),
        };
        for item in graph {
            match item {
                Value::Object(object) => crate_graph.push(Entity::from_object(object)),
                other => tracing::debug!(item = %other, "skipping non-object graph item"),
            }
        }
        Ok(crate_graph)
    }

    fn push(&mut self, entity: Entity) {
        if let Some(id) = entity.id() {
            // first entity with a given id wins lookups
            self.index
                .entry(id.to_string())
                .or_insert(self.entities.len());
        }
        self.entities.push(entity);
    }

    pub fn context(&self) -> &Value {
        &self.context
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Look up an entity by id.
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.index.get(id).map(|&i| &self.entities[i])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Entity> {
        let i = *self.index.get(id)?;
        Some(&mut self.entities[i])
    }

    /// Append an entity of type `entity_type` with the given properties.
    pub fn add(&mut self, entity_type: &str, id: &str, props: Value) {
        let mut object = Map::new();
        object.insert("@id".into(), Value::String(id.into()));
        object.insert("@type".into(), Value::String(entity_type.into()));
        if let Value::Object(props) = props {
            for (k, v) in props {
                if k != "@id" && k != "@type" {
                    object.insert(k, v);
                }
            }
        }
        self.push(Entity::from_object(object));
    }

    /// The crate's root data entity, found through the metadata descriptor.
    pub fn root(&self) -> Option<&Entity> {
        let descriptor = self.get(METADATA_FILE)?;
        let root_id = as_reference(descriptor.get("about")?)?;
        self.get(root_id)
    }

    pub fn to_value(&self) -> Value {
        json!({
            "@context": self.context,
            "@graph": self.entities.iter().map(Entity::to_value).collect::<Vec<_>>(),
        })
    }

    /// Write `ro-crate-metadata.json` into `dir`.
    pub fn write_json(&self, dir: &Path) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(&self.to_value()).map_err(std::io::Error::other)?;
        std::fs::write(dir.join(METADATA_FILE), text)
    }

    /// A minimal valid crate: root dataset, license and metadata descriptor.
    pub fn minimal(name: &str, description: &str) -> Self {
        let license_id = "https://creativecommons.org/licenses/by-nc-sa/3.0/au/";
        let mut graph = Self::new();
        graph.add(
            "Dataset",
            "./",
            json!({
                "name": name,
                "description": description,
                "license": {"@id": license_id},
                "datePublished": "2024",
            }),
        );
        graph.add(
            "CreativeWork",
            license_id,
            json!({
                "name": "Attribution-NonCommercial-ShareAlike 3.0 Australia (CC BY-NC-SA 3.0 AU)",
                "description": "Creative Commons licence",
                "identifier": license_id,
            }),
        );
        graph.add(
            "CreativeWork",
            METADATA_FILE,
            json!({
                "about": {"@id": "./"},
                "conformsTo": {"@id": "https://w3id.org/ro/crate/1.1"},
            }),
        );
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_graph_and_indexes_ids() {
        let doc = json!({
            "@context": ROCRATE_CONTEXT,
            "@graph": [
                {"@id": "./", "@type": "Dataset", "name": "Root"},
                {"@type": "Thing", "name": "anonymous"},
                {"@id": "#a", "@type": ["Person", "Agent"], "name": ["Ann", "Anne"]},
            ]
        });
        let graph = CrateGraph::from_value(doc).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.get("./").unwrap().name(), "Root");
        assert_eq!(graph.get("#a").unwrap().types(), vec!["Person", "Agent"]);
        assert_eq!(graph.get("#a").unwrap().name(), "Ann");
        assert!(graph.entities()[1].id().is_none());
    }

    #[test]
    fn missing_graph_is_a_shape_error() {
        let err = CrateGraph::from_value(json!({"@context": {}})).unwrap_err();
        assert!(matches!(err, LoadError::Shape { ref key } if key == "@graph"));
    }

    #[test]
    fn minimal_crate_has_root() {
        let graph = CrateGraph::minimal("Minimal", "A minimal crate");
        let root = graph.root().unwrap();
        assert_eq!(root.id(), Some("./"));
        assert_eq!(root.name(), "Minimal");
    }

    #[test]
    fn directory_source_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let graph = CrateGraph::minimal("On disk", "written then read");
        graph.write_json(dir.path()).unwrap();

        let source = CrateSource::parse(dir.path().to_str().unwrap());
        assert!(matches!(source, CrateSource::Directory(_)));
        let loaded = source.load().unwrap();
        assert_eq!(loaded.len(), graph.len());
        assert_eq!(loaded.root().unwrap().name(), "On disk");
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = CrateSource::Directory(dir.path().join("nope"));
        assert!(matches!(source.load(), Err(LoadError::Io { .. })));
    }

    #[test]
    fn scalar_string_keeps_structure() {
        assert_eq!(scalar_string(&json!("text")), "text");
        assert_eq!(scalar_string(&json!(42)), "42");
        assert_eq!(scalar_string(&json!({"a": [1, 2]})), r#"{"a":[1,2]}"#);
    }
}
