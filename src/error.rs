//! Rich diagnostic error types for the rocrate-tabular engine.
//!
//! Each stage of the pipeline defines its own error type with miette
//! `#[diagnostic]` derives, so the CLI can report an error code and a hint
//! about how to fix the input, the configuration or the environment.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the tabulator.
///
/// Each variant wraps a stage-specific error, preserving the full diagnostic
/// chain (error codes, help text, sources) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum TabularError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Flatten(#[from] FlattenError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Context(#[from] ContextError),
}

// ---------------------------------------------------------------------------
// Load errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LoadError {
    #[error("failed to read crate metadata: {path}")]
    #[diagnostic(
        code(rocrate_tabular::load::io),
        help(
            "A crate directory must contain `ro-crate-metadata.json`. \
             Check the path, or pass the metadata file itself."
        )
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch crate from {url}: {message}")]
    #[diagnostic(
        code(rocrate_tabular::load::http),
        help("Check that the URL is reachable and returns RO-Crate JSON-LD.")
    )]
    Http { url: String, message: String },

    #[error("crate metadata is not valid JSON: {message}")]
    #[diagnostic(
        code(rocrate_tabular::load::parse),
        help("The metadata document must be a JSON object. Validate it with a JSON linter.")
    )]
    Parse { message: String },

    #[error("crate metadata has no `{key}` entry")]
    #[diagnostic(
        code(rocrate_tabular::load::shape),
        help(
            "The document must look like {{\"@context\": ..., \"@graph\": [...]}}. \
             Flattened JSON-LD is the only supported shape."
        )
    )]
    Shape { key: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("no flattening configuration loaded")]
    #[diagnostic(
        code(rocrate_tabular::config::missing),
        help("Load a config file or call `infer_config()` after loading a crate.")
    )]
    Missing,

    #[error("a crate must be loaded before {operation}")]
    #[diagnostic(
        code(rocrate_tabular::config::no_crate),
        help("Call `load_crate()` first so the property table exists.")
    )]
    NoCrate { operation: String },

    #[error("type \"{table}\" is not configured as a table")]
    #[diagnostic(
        code(rocrate_tabular::config::table_not_configured),
        help(
            "Move the entry for \"{table}\" from `potential_tables` to `tables` \
             in the config file, then run again."
        )
    )]
    TableNotConfigured { table: String },

    #[error("type \"{table}\" would overwrite the reserved \"{table}\" table")]
    #[diagnostic(
        code(rocrate_tabular::config::reserved_table),
        help(
            "Remove \"{table}\" from `tables` in the config file; \
             `property` and `csv_files` hold the tabulator's own data."
        )
    )]
    ReservedTable { table: String },

    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(rocrate_tabular::config::read),
        help("Ensure the config file exists and is readable, or delete it to regenerate a default.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(rocrate_tabular::config::parse),
        help("Check the syntax of the config file. `.toml` files are read as TOML, anything else as JSON.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(rocrate_tabular::config::write),
        help("Ensure you have write permissions to the config location.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Flattening errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum FlattenError {
    #[error("too many columns for {column} on entity {entity_id}: suffix limit is {max}")]
    #[diagnostic(
        code(rocrate_tabular::flatten::too_many_columns),
        help(
            "The property repeats more often than `max_column_suffix` allows. \
             Add it to the table's `junctions` list, lower the junction threshold, \
             or raise the suffix limit."
        )
    )]
    TooManyColumns {
        column: String,
        entity_id: String,
        max: usize,
    },
}

/// Failure to resolve text content for an entity.
///
/// Never escapes the flattener: it is rendered into the row as an inline
/// `load failed: ...` marker.
#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("no target entity to fetch")]
    #[diagnostic(code(rocrate_tabular::fetch::no_target))]
    NoTarget,

    #[error("cannot read {path}: {source}")]
    #[diagnostic(code(rocrate_tabular::fetch::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot fetch {url}: {message}")]
    #[diagnostic(code(rocrate_tabular::fetch::http))]
    Http { url: String, message: String },
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("SQLite error: {source}")]
    #[diagnostic(
        code(rocrate_tabular::store::sqlite),
        help(
            "The SQLite database rejected an operation. If this happened while \
             running an export query, check the query against the table schema."
        )
    )]
    Sqlite {
        #[from]
        source: rusqlite::Error,
    },

    #[error("failed to prepare database file {path}")]
    #[diagnostic(
        code(rocrate_tabular::store::io),
        help("Check that the output location is writable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ExportError {
    #[error("failed to write {path}")]
    #[diagnostic(
        code(rocrate_tabular::export::io),
        help("Ensure the output directory is writable and the disk is not full.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize schema description: {message}")]
    #[diagnostic(code(rocrate_tabular::export::serialize))]
    Serialize { message: String },
}

// ---------------------------------------------------------------------------
// JSON-LD context errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ContextError {
    #[error("failed to load JSON-LD context {location}: {message}")]
    #[diagnostic(
        code(rocrate_tabular::context::load),
        help("Check the context URL or file. Export falls back to the inline parts of the context.")
    )]
    Load { location: String, message: String },

    #[error("unsupported JSON-LD context entry: {found}")]
    #[diagnostic(
        code(rocrate_tabular::context::shape),
        help("A context must be an object, a URL/path string, or an array of those.")
    )]
    Shape { found: String },
}

/// Convenience alias for functions returning tabulator results.
pub type TabularResult<T> = std::result::Result<T, TabularError>;
