//! JSON-LD context handling: resolve short property names to IRIs.
//!
//! A context is an object, a URL or file path naming a context document, or
//! an array of those. Pieces are merged left to right into one term map.
//! Remote pieces are loaded through a [`ContextLoader`] so tests and offline
//! runs can supply documents without the network.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::error::ContextError;

/// Loads a context document named by URL or path.
pub trait ContextLoader {
    fn load(&self, location: &str) -> Result<Value, ContextError>;
}

/// Loads contexts over HTTP(S) with `ureq`, or from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultLoader;

impl ContextLoader for DefaultLoader {
    fn load(&self, location: &str) -> Result<Value, ContextError> {
        let err = |message: String| ContextError::Load {
            location: location.to_string(),
            message,
        };
        if location.starts_with("http://") || location.starts_with("https://") {
            let response = ureq::get(location)
                .set("Accept", "application/ld+json, application/json")
                .call()
                .map_err(|e| err(e.to_string()))?;
            response.into_json::<Value>().map_err(|e| err(e.to_string()))
        } else {
            let text = std::fs::read_to_string(location).map_err(|e| err(e.to_string()))?;
            serde_json::from_str(&text).map_err(|e| err(e.to_string()))
        }
    }
}

/// In-memory loader keyed by location.
#[derive(Debug, Default, Clone)]
pub struct StaticLoader {
    documents: HashMap<String, Value>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, location: &str, document: Value) -> Self {
        self.documents.insert(location.to_string(), document);
        self
    }
}

impl ContextLoader for StaticLoader {
    fn load(&self, location: &str) -> Result<Value, ContextError> {
        self.documents
            .get(location)
            .cloned()
            .ok_or_else(|| ContextError::Load {
                location: location.to_string(),
                message: "not available".into(),
            })
    }
}

/// Maps a term to a vocabulary IRI.
pub trait TermResolver {
    /// Expand `term`; returns the term unchanged when nothing applies.
    fn resolve_term(&self, term: &str) -> String;

    /// The IRI for `term`, or `None` when it cannot be resolved.
    fn resolve_iri(&self, term: &str) -> Option<String> {
        let resolved = self.resolve_term(term);
        if is_iri(&resolved) { Some(resolved) } else { None }
    }
}

fn is_iri(term: &str) -> bool {
    match term.split_once(':') {
        Some((scheme, rest)) => {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
                && (rest.starts_with("//") || scheme == "urn")
        }
        None => false,
    }
}

/// Term map built from a JSON-LD `@context`.
#[derive(Debug, Clone, Default)]
pub struct ContextResolver {
    terms: Map<String, Value>,
}

impl ContextResolver {
    /// Build from a context value; any unloadable piece is an error.
    pub fn new(context: &Value, loader: &dyn ContextLoader) -> Result<Self, ContextError> {
        let mut resolver = Self::default();
        resolver.merge(context, loader, true, &mut HashSet::new())?;
        Ok(resolver)
    }

    /// Build from a context value, skipping pieces that fail to load.
    pub fn lenient(context: &Value, loader: &dyn ContextLoader) -> Self {
        let mut resolver = Self::default();
        // strict=false never returns Err
        let _ = resolver.merge(context, loader, false, &mut HashSet::new());
        resolver
    }

    /// `seen` holds the remote locations already loaded; each loads once.
    fn merge(
        &mut self,
        context: &Value,
        loader: &dyn ContextLoader,
        strict: bool,
        seen: &mut HashSet<String>,
    ) -> Result<(), ContextError> {
        match context {
            Value::Null => Ok(()),
            Value::Object(map) => {
                // a fetched document wraps its definitions in "@context"
                if let Some(inner) = map.get("@context") {
                    return self.merge(inner, loader, strict, seen);
                }
                for (k, v) in map {
                    self.terms.insert(k.clone(), v.clone());
                }
                Ok(())
            }
            Value::Array(items) => {
                for item in items {
                    self.merge(item, loader, strict, seen)?;
                }
                Ok(())
            }
            Value::String(location) if !seen.insert(location.clone()) => {
                tracing::warn!(location = %location, "context already loaded, skipping cycle");
                Ok(())
            }
            Value::String(location) => match loader.load(location) {
                Ok(document) => self.merge(&document, loader, strict, seen),
                Err(e) if strict => Err(e),
                Err(e) => {
                    tracing::warn!(location = %location, error = %e, "skipping JSON-LD context");
                    Ok(())
                }
            },
            other if strict => Err(ContextError::Shape {
                found: other.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn expand_curie(&self, term: &str) -> Option<String> {
        let (prefix, suffix) = term.split_once(':')?;
        if suffix.starts_with("//") {
            return None;
        }
        let base = match self.terms.get(prefix)? {
            Value::String(s) => s.as_str(),
            Value::Object(def) => def.get("@id")?.as_str()?,
            _ => return None,
        };
        Some(format!("{base}{suffix}"))
    }
}

impl TermResolver for ContextResolver {
    fn resolve_term(&self, term: &str) -> String {
        if term.starts_with('@') || is_iri(term) {
            return term.to_string();
        }
        let defined = match self.terms.get(term) {
            Some(Value::String(s)) => Some(s.as_str()),
            Some(Value::Object(def)) => def.get("@id").and_then(Value::as_str),
            _ => None,
        };
        if let Some(definition) = defined {
            return self
                .expand_curie(definition)
                .unwrap_or_else(|| definition.to_string());
        }
        if let Some(expanded) = self.expand_curie(term) {
            return expanded;
        }
        if let Some(Value::String(vocab)) = self.terms.get("@vocab") {
            return format!("{vocab}{term}");
        }
        term.to_string()
    }
}
