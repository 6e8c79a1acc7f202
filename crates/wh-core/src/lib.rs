//! wh-core: Core library for reconciling Wahapedia CSV exports
//!
//! This library provides functionality to:
//! - Parse `|`-separated CSV exports with per-type column remapping
//! - Derive stable identifiers for records without a natural key
//! - Resolve cross-references between entity types
//! - Create or update entities in an [`EntityStore`], respecting locks
//! - Run dependency-ordered, chunked imports with aggregated results

pub mod auxiliary;
pub mod config;
pub mod entity;
pub mod error;
pub mod identity;
pub mod importer;
pub mod linker;
pub mod mapping;
pub mod orchestrator;
pub mod parser;
pub mod reconcile;
pub mod record;
pub mod sanitize;
pub mod scanner;
pub mod schema;
pub mod store;

pub use auxiliary::DamageTables;
pub use config::ImportConfig;
pub use entity::{ChildRecord, Entity, EntityId, FieldValue};
pub use error::{Error, Result};
pub use identity::{resolve_id, wid_from_string};
pub use importer::{link, prepare, Enrichment, Prepared};
pub use linker::LinkCache;
pub use mapping::ColumnMapping;
pub use orchestrator::{
    delete_entities, DeleteReport, ImportOptions, ImportRun, ImportSummary, SourceError,
    StatusLevel, StatusMessage, StepReport, TypeSummary,
};
pub use parser::{parse_csv, parse_csv_str, ParseOptions};
pub use reconcile::{upsert, BatchResult, ImportRecord};
pub use record::{RawRecord, RecordSet};
pub use sanitize::Sanitizer;
pub use scanner::{scan_sources, ScanResult};
pub use schema::{AuxiliaryKind, EntityType, EntityTypeSpec, FieldKind, SourceKey};
pub use store::{EntityStore, MemoryStore, Properties, StoreError, StoreResult};
