//! region-annotator - genomic region annotation engine.
//!
//! Annotates user-supplied genomic regions (chromosome + start/end
//! coordinates) with overlapping or nearby entries from fixed reference
//! datasets (gene catalog, GWAS catalog, OMIM, psychiatric CNVs, ASD genes,
//! ID/developmental-delay genes, mouse-knockout phenotypes) and exports the
//! annotated results.
//!
//! # Architecture
//!
//! - Schema catalog ([`schema`]): immutable, typed dataset templates
//! - Tabular records ([`record`]): schema copies plus ordered rows
//! - Data store ([`store`]): embedded relational storage with explicit
//!   commit checkpoints
//! - Format adapters ([`format`]): spreadsheet, delimited text, and the
//!   native serialized row format
//! - Annotation pipeline ([`pipeline`]): the ordered interval-overlap /
//!   nearest-gene join stages, built on the query layer ([`query`])
//!
//! # Example
//!
//! ```ignore
//! use region_annotator::{Catalog, DataStore, TableSource};
//! use region_annotator::{format, pipeline, schema};
//!
//! let catalog = Catalog::builtin()?;
//! let mut store = DataStore::new(db_dir, 2_000_000, 30_000);
//! store.connect()?;
//!
//! let schema = catalog.lookup(schema::USER_INPUT_RAW)?;
//! let record = format::read_file(&input, format::Format::Csv, schema, true)?;
//! store.create_table(schema::USER_INPUT_RAW, TableSource::Rows(&record), true)?;
//! store.commit()?;
//!
//! pipeline::run(&store, true)?;
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod output;
pub mod pipeline;
pub mod query;
pub mod record;
pub mod schema;
pub mod store;

pub use config::{IngestKind, RunConfig};
pub use error::{Error, Result};
pub use format::Format;
pub use record::{TabularRecord, Value};
pub use schema::{Catalog, ColumnSpec, ColumnType, Schema};
pub use store::{DataStore, TableSource};
