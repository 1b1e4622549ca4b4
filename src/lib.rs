// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # rocrate-tabular
//!
//! Flattens an RO-Crate metadata graph (JSON-LD) into relational tables in
//! SQLite: one `property` table with every edge of the graph, one table per
//! configured entity type, and association tables for properties too wide
//! to inline.
//!
//! ## Pipeline
//!
//! - **Extraction** (`extract`): graph → ordered [`extract::PropertyEdge`]s
//! - **Planning** (`plan`): route over-threshold properties to junctions
//! - **Flattening** (`flatten`): one row per entity with collision-numbered columns
//! - **Junctions** (`junction`): `<type>_<label>` association tables
//! - **Export** (`export`): CSV per configured query plus an RO-Crate sidecar
//!
//! ## Library usage
//!
//! ```no_run
//! use rocrate_tabular::engine::{Tabulator, TabulatorConfig};
//! use rocrate_tabular::graph::CrateSource;
//! use std::path::Path;
//!
//! let mut tab = Tabulator::open(Path::new("output.db"), TabulatorConfig::default()).unwrap();
//! tab.load_crate(&CrateSource::parse("path/to/crate")).unwrap();
//! tab.infer_config().unwrap().promote_all();
//! tab.build_all().unwrap();
//! tab.write_config(Path::new("config.json")).unwrap();
//! ```

pub mod config;
pub mod context;
pub mod delimited;
pub mod engine;
pub mod error;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod flatten;
pub mod graph;
pub mod ingest;
pub mod junction;
pub mod plan;
pub mod store;
