//! Tabulator facade: top-level API for rocrate-tabular.
//!
//! The `Tabulator` owns the SQLite store, the extracted edges of the loaded
//! crate and the flattening configuration, and runs the pipeline stages
//! against them: load, infer/read config, plan, build, export.

use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

use crate::config::FlattenConfig;
use crate::context::{ContextLoader, ContextResolver, DefaultLoader};
use crate::error::{ConfigError, TabularResult};
use crate::export::{ExportedFile, Exporter};
use crate::extract::EdgeSet;
use crate::fetch::{ContentFetcher, CrateFetcher};
use crate::flatten::{DEFAULT_MAX_COLUMN_SUFFIX, EntityFlattener};
use crate::graph::{CrateGraph, CrateSource, ROCRATE_CONTEXT};
use crate::ingest::{self, IngestSummary};
use crate::junction::JunctionWriter;
use crate::plan::{DEFAULT_JUNCTION_THRESHOLD, TablePlanner};
use crate::store::{PROPERTY_TABLE, SqliteStore};

/// Run settings for the tabulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabulatorConfig {
    /// More values than this for one label on one entity routes the label
    /// to a junction table (default: 10).
    pub junction_threshold: usize,
    /// Highest collision suffix a column may get (default: 999).
    pub max_column_suffix: usize,
    /// Label whose targets are fetched and stored as text.
    pub text_prop: Option<String>,
}

impl Default for TabulatorConfig {
    fn default() -> Self {
        Self {
            junction_threshold: DEFAULT_JUNCTION_THRESHOLD,
            max_column_suffix: DEFAULT_MAX_COLUMN_SUFFIX,
            text_prop: None,
        }
    }
}

/// Flattens an RO-Crate graph into SQLite tables.
pub struct Tabulator {
    settings: TabulatorConfig,
    store: SqliteStore,
    edges: EdgeSet,
    graph: Option<CrateGraph>,
    source: Option<CrateSource>,
    config: Option<FlattenConfig>,
    fetcher: Box<dyn ContentFetcher>,
    context_loader: Box<dyn ContextLoader>,
}

impl Tabulator {
    /// Create a tabulator writing a fresh database at `db_path`.
    pub fn open(db_path: &Path, settings: TabulatorConfig) -> TabularResult<Self> {
        tracing::info!(db = %db_path.display(), "creating output database");
        Ok(Self::with_store(SqliteStore::create(db_path)?, settings))
    }

    /// Create a tabulator over an in-memory database.
    pub fn in_memory(settings: TabulatorConfig) -> TabularResult<Self> {
        Ok(Self::with_store(SqliteStore::in_memory()?, settings))
    }

    fn with_store(store: SqliteStore, settings: TabulatorConfig) -> Self {
        Self {
            settings,
            store,
            edges: EdgeSet::default(),
            graph: None,
            source: None,
            config: None,
            fetcher: Box::new(CrateFetcher::detached()),
            context_loader: Box::new(DefaultLoader),
        }
    }

    /// Replace the text fetcher. `load_crate` installs a fetcher for the
    /// crate's location, so call this afterwards.
    pub fn with_fetcher(mut self, fetcher: Box<dyn ContentFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replace the loader used for remote JSON-LD contexts during export.
    pub fn with_context_loader(mut self, loader: Box<dyn ContextLoader>) -> Self {
        self.context_loader = loader;
        self
    }

    /// Load a crate and write its `property` table. Returns the edge count.
    pub fn load_crate(&mut self, source: &CrateSource) -> TabularResult<usize> {
        tracing::info!(source = %source, "loading crate");
        let graph = source.load()?;
        self.fetcher = Box::new(CrateFetcher::new(source));
        self.source = Some(source.clone());
        self.load_graph(graph)
    }

    /// Use an already parsed graph. Returns the edge count.
    pub fn load_graph(&mut self, graph: CrateGraph) -> TabularResult<usize> {
        self.edges = EdgeSet::from_graph(&graph);
        self.store.write_properties(self.edges.all())?;
        tracing::info!(
            entities = graph.len(),
            edges = self.edges.len(),
            "built property table"
        );
        self.graph = Some(graph);
        Ok(self.edges.len())
    }

    fn require_crate(&self, operation: &str) -> Result<(), ConfigError> {
        if self.graph.is_none() {
            return Err(ConfigError::NoCrate {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Replace the configuration with one inferred from the loaded crate.
    pub fn infer_config(&mut self) -> TabularResult<&mut FlattenConfig> {
        self.require_crate("inferring a configuration")?;
        Ok(self.config.insert(FlattenConfig::infer(&self.edges)))
    }

    pub fn read_config(&mut self, path: &Path) -> TabularResult<&mut FlattenConfig> {
        let config = FlattenConfig::load(path)?;
        tracing::info!(
            path = %path.display(),
            tables = config.tables.len(),
            "loaded configuration"
        );
        Ok(self.config.insert(config))
    }

    pub fn write_config(&self, path: &Path) -> TabularResult<()> {
        self.config()?.save(path)?;
        tracing::info!(path = %path.display(), "wrote configuration");
        Ok(())
    }

    pub fn set_config(&mut self, config: FlattenConfig) {
        self.config = Some(config);
    }

    pub fn config(&self) -> Result<&FlattenConfig, ConfigError> {
        self.config.as_ref().ok_or(ConfigError::Missing)
    }

    pub fn config_mut(&mut self) -> Result<&mut FlattenConfig, ConfigError> {
        self.config.as_mut().ok_or(ConfigError::Missing)
    }

    /// Route over-threshold labels of `entity_type` to junction tables.
    pub fn plan(&mut self, entity_type: &str) -> TabularResult<Vec<String>> {
        self.require_crate("planning")?;
        let config = self.config.as_mut().ok_or(ConfigError::Missing)?;
        let planner = TablePlanner::new(&self.edges, self.settings.junction_threshold);
        Ok(planner.plan(config, entity_type)?)
    }

    /// Plan, then rebuild the table for `entity_type` and its junction
    /// tables. Returns every property label seen while building; they are
    /// also merged into the type's `all_props`.
    pub fn build_table(&mut self, entity_type: &str) -> TabularResult<IndexSet<String>> {
        if [PROPERTY_TABLE, ingest::CSV_TABLE]
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(entity_type))
        {
            return Err(ConfigError::ReservedTable {
                table: entity_type.to_string(),
            }
            .into());
        }
        self.plan(entity_type)?;
        let table = self.config()?.table(entity_type)?.clone();

        let flattener = EntityFlattener::new(
            &self.edges,
            self.fetcher.as_ref(),
            self.settings.max_column_suffix,
        )
        .with_text_prop(self.settings.text_prop.as_deref());
        let build = flattener.build_table(&self.store, entity_type, &table)?;
        JunctionWriter::new(&self.store).write(entity_type, &table.junctions, &build.junctions)?;

        self.config_mut()?
            .table_mut(entity_type)?
            .merge_props(&build.props);
        tracing::info!(
            table = entity_type,
            rows = build.rows,
            props = build.props.len(),
            "built table"
        );
        Ok(build.props)
    }

    /// Build every configured table, in configuration order.
    pub fn build_all(&mut self) -> TabularResult<IndexMap<String, IndexSet<String>>> {
        let types: Vec<String> = self.config()?.tables.keys().cloned().collect();
        let mut built = IndexMap::with_capacity(types.len());
        for entity_type in types {
            let props = self.build_table(&entity_type)?;
            built.insert(entity_type, props);
        }
        Ok(built)
    }

    /// Run every export query into `out_dir`, with a metadata sidecar.
    pub fn export_csv(&self, out_dir: &Path) -> TabularResult<Vec<ExportedFile>> {
        let config = self.config()?;
        let context = self
            .graph
            .as_ref()
            .map(|g| g.context().clone())
            .unwrap_or_else(|| Value::String(ROCRATE_CONTEXT.into()));
        let resolver = ContextResolver::lenient(&context, self.context_loader.as_ref());
        Exporter::new(&self.store, context, &resolver).export_csv(&config.export_queries, out_dir)
    }

    /// Load CSV `File` entities of a directory crate into `csv_files`.
    pub fn ingest_csv_files(&self) -> TabularResult<IngestSummary> {
        self.require_crate("ingesting CSV files")?;
        let Some(dir) = self.source.as_ref().and_then(CrateSource::base_dir) else {
            tracing::warn!("CSV ingestion needs a local crate directory; skipping");
            return Ok(IngestSummary::default());
        };
        Ok(ingest::ingest_csv_files(&self.store, &self.edges, dir)?)
    }

    /// Ids of entities of `entity_type`, as recorded in the `property` table.
    pub fn fetch_ids(&self, entity_type: &str) -> TabularResult<Vec<String>> {
        Ok(self.store.fetch_ids(entity_type)?)
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn edges(&self) -> &EdgeSet {
        &self.edges
    }

    pub fn graph(&self) -> Option<&CrateGraph> {
        self.graph.as_ref()
    }

    pub fn settings(&self) -> &TabulatorConfig {
        &self.settings
    }

    /// Summary of the current state.
    pub fn info(&self) -> TabularResult<TabulatorInfo> {
        Ok(TabulatorInfo {
            entities: self.graph.as_ref().map_or(0, CrateGraph::len),
            edges: self.edges.len(),
            tables: self.config.as_ref().map_or(0, |c| c.tables.len()),
            potential_tables: self.config.as_ref().map_or(0, |c| c.potential_tables.len()),
            db_tables: self.store.tables()?,
        })
    }
}

/// Counts reported after a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabulatorInfo {
    pub entities: usize,
    pub edges: usize,
    pub tables: usize,
    pub potential_tables: usize,
    pub db_tables: Vec<String>,
}

impl std::fmt::Display for TabulatorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "rocrate-tabular summary")?;
        writeln!(f, "  entities:          {}", self.entities)?;
        writeln!(f, "  property edges:    {}", self.edges)?;
        writeln!(f, "  tables:            {}", self.tables)?;
        writeln!(f, "  potential tables:  {}", self.potential_tables)?;
        writeln!(f, "  database tables:   {}", self.db_tables.join(", "))?;
        Ok(())
    }
}

impl std::fmt::Debug for Tabulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tabulator")
            .field("settings", &self.settings)
            .field("source", &self.source)
            .field("edges", &self.edges.len())
            .field("configured", &self.config.is_some())
            .finish()
    }
}
