//! Dependency-ordered, chunked import runs
//!
//! An [`ImportRun`] advances one chunk of one entity type per
//! [`ImportRun::step`], so a host can report progress or stop between
//! chunks. Chunks already saved stay saved.

use crate::auxiliary::DamageTables;
use crate::error::{Error, Result};
use crate::importer::{link, prepare, Enrichment};
use crate::linker::LinkCache;
use crate::parser::{parse_csv, ParseOptions};
use crate::reconcile::{upsert, BatchResult};
use crate::record::{RawRecord, RecordSet};
use crate::schema::{AuxiliaryKind, EntityType, SourceKey};
use crate::store::EntityStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Default number of records reconciled per step
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default text-format tag for long-text fields
pub const DEFAULT_TEXT_FORMAT: &str = "basic_html";

/// Options of one import run
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub update_existing: bool,
    pub chunk_size: usize,
    pub text_format: String,
    pub parse: ParseOptions,
    /// Processing order of entity types
    pub order: Vec<EntityType>,
    /// Entity types parsed but not reconciled
    pub disabled: BTreeSet<EntityType>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            update_existing: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            text_format: DEFAULT_TEXT_FORMAT.to_string(),
            parse: ParseOptions::default(),
            order: EntityType::ALL.to_vec(),
            disabled: BTreeSet::new(),
        }
    }
}

/// A source that could not be used
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    pub source: String,
    pub path: PathBuf,
    pub message: String,
}

/// Aggregated counts for one entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSummary {
    pub entity_type: EntityType,
    pub chunks: usize,
    pub records: usize,
    pub saved: usize,
    pub errors: usize,
    pub existing_not_updated: usize,
}

impl TypeSummary {
    fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            chunks: 0,
            records: 0,
            saved: 0,
            errors: 0,
            existing_not_updated: 0,
        }
    }

    fn add(&mut self, result: BatchResult) {
        self.saved += result.saved;
        self.errors += result.errors;
        self.existing_not_updated += result.existing_not_updated;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// A user-facing line derived from the summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
}

impl StatusMessage {
    fn new(level: StatusLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.level {
            StatusLevel::Info => "info",
            StatusLevel::Warning => "warning",
            StatusLevel::Error => "error",
        };
        write!(f, "[{}] {}", tag, self.text)
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Per-type counts, in processing order
    pub types: Vec<TypeSummary>,
    pub source_errors: Vec<SourceError>,
}

impl ImportSummary {
    pub fn get(&self, entity_type: EntityType) -> Option<&TypeSummary> {
        self.types.iter().find(|t| t.entity_type == entity_type)
    }

    fn entry(&mut self, entity_type: EntityType) -> &mut TypeSummary {
        let position = match self.types.iter().position(|t| t.entity_type == entity_type) {
            Some(position) => position,
            None => {
                self.types.push(TypeSummary::new(entity_type));
                self.types.len() - 1
            }
        };
        &mut self.types[position]
    }

    /// Counts summed over every entity type
    pub fn totals(&self) -> BatchResult {
        let mut totals = BatchResult::default();
        for t in &self.types {
            totals += BatchResult {
                saved: t.saved,
                errors: t.errors,
                existing_not_updated: t.existing_not_updated,
            };
        }
        totals
    }

    /// Status lines for the user, one group per entity type
    pub fn messages(&self) -> Vec<StatusMessage> {
        let mut messages = Vec::new();

        for e in &self.source_errors {
            messages.push(StatusMessage::new(
                StatusLevel::Error,
                format!(
                    "Unable to load source '{}' from {}: {}",
                    e.source,
                    e.path.display(),
                    e.message
                ),
            ));
        }

        for t in &self.types {
            messages.push(StatusMessage::new(
                StatusLevel::Info,
                format!(
                    "Processed {} {} records in {} chunks",
                    t.records, t.entity_type, t.chunks
                ),
            ));
            if t.saved > 0 {
                messages.push(StatusMessage::new(
                    StatusLevel::Info,
                    format!("Saved {} {} entities", t.saved, t.entity_type),
                ));
            }
            if t.errors > 0 {
                messages.push(StatusMessage::new(
                    StatusLevel::Error,
                    format!("{} errors for {} entities", t.errors, t.entity_type),
                ));
            }
            if t.existing_not_updated > 0 {
                messages.push(StatusMessage::new(
                    StatusLevel::Warning,
                    format!(
                        "{} {} entities already exist and were not updated",
                        t.existing_not_updated, t.entity_type
                    ),
                ));
            }
        }

        let names: Vec<&str> = self.types.iter().map(|t| t.entity_type.as_str()).collect();
        messages.push(StatusMessage::new(
            StatusLevel::Info,
            format!("{} entity types processed: {}", names.len(), names.join(", ")),
        ));
        messages
    }
}

/// Progress of one [`ImportRun::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    pub entity_type: EntityType,
    /// 1-based chunk number within the entity type
    pub chunk: usize,
    pub total_chunks: usize,
    pub records: usize,
    pub result: BatchResult,
}

/// Prepared records of the entity type being imported
#[derive(Debug)]
struct Pending {
    entity_type: EntityType,
    records: Vec<RawRecord>,
    offset: usize,
    chunk: usize,
    total_chunks: usize,
}

/// One import run over a set of parsed sources
#[derive(Debug)]
pub struct ImportRun {
    options: ImportOptions,
    sets: BTreeMap<EntityType, RecordSet>,
    damage: Option<DamageTables>,
    queue: VecDeque<EntityType>,
    current: Option<Pending>,
    cache: LinkCache,
    summary: ImportSummary,
}

impl ImportRun {
    /// Classify and parse the configured sources
    ///
    /// A source that cannot be read is recorded in the summary and its
    /// entity type is skipped; the other sources still import.
    pub fn new(sources: &BTreeMap<String, PathBuf>, options: ImportOptions) -> Result<Self> {
        let mut parsed = BTreeMap::new();
        let mut source_errors = Vec::new();

        for (name, path) in sources {
            let key = match name.parse::<SourceKey>() {
                Ok(key) => key,
                Err(e) => {
                    warn!(source = %name, "ignoring unknown source");
                    source_errors.push(SourceError {
                        source: name.clone(),
                        path: path.clone(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            let mapping = match key {
                SourceKey::Entity(t) => Some(t.spec().mapping()),
                SourceKey::Auxiliary(_) => None,
            };
            match parse_csv(path, mapping.as_ref(), &options.parse) {
                Ok(set) => {
                    info!(source = %key, path = %path.display(), records = set.len(), "loaded source");
                    parsed.insert(key, set);
                }
                Err(e) => {
                    warn!(source = %key, path = %path.display(), error = %e, "unable to load source");
                    source_errors.push(SourceError {
                        source: name.clone(),
                        path: path.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let mut run = Self::from_record_sets(parsed, options)?;
        run.summary.source_errors = source_errors;
        Ok(run)
    }

    /// Start a run over sources that are already parsed
    pub fn from_record_sets(
        sets: BTreeMap<SourceKey, RecordSet>,
        options: ImportOptions,
    ) -> Result<Self> {
        if options.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk size must be at least 1".into()));
        }

        let mut entity_sets = BTreeMap::new();
        let mut damage = None;
        for (key, set) in sets {
            match key {
                SourceKey::Entity(t) => {
                    entity_sets.insert(t, set);
                }
                SourceKey::Auxiliary(AuxiliaryKind::DatasheetDamage) => {
                    let tables = DamageTables::from_records(&set);
                    debug!(datasheets = tables.len(), "built damage tables");
                    damage = Some(tables);
                }
            }
        }

        let queue = options
            .order
            .iter()
            .copied()
            .filter(|t| {
                let enabled = !options.disabled.contains(t);
                if !enabled {
                    debug!(entity_type = %t, "entity type disabled");
                }
                enabled && entity_sets.contains_key(t)
            })
            .collect();

        Ok(Self {
            options,
            sets: entity_sets,
            damage,
            queue,
            current: None,
            cache: LinkCache::new(),
            summary: ImportSummary::default(),
        })
    }

    /// Whether every queued entity type has been processed
    pub fn is_finished(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }

    /// Entity types still waiting, including the one in progress
    pub fn remaining(&self) -> Vec<EntityType> {
        self.current
            .iter()
            .map(|p| p.entity_type)
            .chain(self.queue.iter().copied())
            .collect()
    }

    pub fn summary(&self) -> &ImportSummary {
        &self.summary
    }

    /// Reconcile the next chunk; `None` once the run is finished
    pub fn step<S: EntityStore + ?Sized>(&mut self, store: &mut S) -> Option<StepReport> {
        loop {
            if self.current.is_none() {
                let entity_type = self.queue.pop_front()?;
                self.start(entity_type);
            }
            let pending = self.current.as_mut()?;

            if pending.offset >= pending.records.len() {
                let entity_type = pending.entity_type;
                self.current = None;
                if let Some(t) = self.summary.get(entity_type) {
                    info!(
                        %entity_type,
                        records = t.records,
                        saved = t.saved,
                        errors = t.errors,
                        existing_not_updated = t.existing_not_updated,
                        "finished entity type"
                    );
                }
                continue;
            }

            let entity_type = pending.entity_type;
            let end = (pending.offset + self.options.chunk_size).min(pending.records.len());
            let chunk = &pending.records[pending.offset..end];
            pending.offset = end;
            pending.chunk += 1;

            let enrichment = enrichment_for(entity_type, &self.sets, self.damage.as_ref());
            let linked = link(&*store, entity_type, chunk, &enrichment, &mut self.cache);
            let records = linked.len();
            let result = upsert(
                store,
                entity_type,
                linked,
                &self.options.text_format,
                self.options.update_existing,
            );

            let summary = self.summary.entry(entity_type);
            summary.chunks += 1;
            summary.records += records;
            summary.add(result);

            debug!(
                %entity_type,
                chunk = pending.chunk,
                total = pending.total_chunks,
                saved = result.saved,
                errors = result.errors,
                "processed chunk"
            );
            if result.errors > 0 {
                error!(%entity_type, errors = result.errors, "chunk finished with errors");
            }

            return Some(StepReport {
                entity_type,
                chunk: pending.chunk,
                total_chunks: pending.total_chunks,
                records,
                result,
            });
        }
    }

    /// Process every remaining chunk
    pub fn run<S: EntityStore + ?Sized>(mut self, store: &mut S) -> ImportSummary {
        while self.step(store).is_some() {}
        self.summary
    }

    fn start(&mut self, entity_type: EntityType) {
        let Some(set) = self.sets.get(&entity_type) else {
            return;
        };
        let enrichment = enrichment_for(entity_type, &self.sets, self.damage.as_ref());
        let prepared = prepare(entity_type, set, &enrichment, &mut self.cache);

        let summary = self.summary.entry(entity_type);
        summary.errors += prepared.unidentified;

        let total_chunks = prepared.records.len().div_ceil(self.options.chunk_size);
        debug!(%entity_type, records = prepared.records.len(), total_chunks, "starting entity type");
        self.current = Some(Pending {
            entity_type,
            records: prepared.records,
            offset: 0,
            chunk: 0,
            total_chunks,
        });
    }
}

fn enrichment_for<'a>(
    entity_type: EntityType,
    sets: &'a BTreeMap<EntityType, RecordSet>,
    damage: Option<&'a DamageTables>,
) -> Enrichment<'a> {
    let spec = entity_type.spec();
    Enrichment {
        parents: spec.inherit.and_then(|rule| sets.get(&rule.parent)),
        children: spec.gather.and_then(|rule| sets.get(&rule.child)),
        damage: spec.auxiliary.and(damage),
    }
}

/// Result of deleting one entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub entity_type: EntityType,
    pub deleted: usize,
    pub errors: usize,
}

/// Delete every entity of the given types
pub fn delete_entities<S: EntityStore + ?Sized>(
    store: &mut S,
    types: &[EntityType],
) -> Vec<DeleteReport> {
    types
        .iter()
        .map(|&entity_type| {
            let mut report = DeleteReport {
                entity_type,
                deleted: 0,
                errors: 0,
            };
            let entities = match store.load_multiple(entity_type) {
                Ok(entities) => entities,
                Err(e) => {
                    error!(%entity_type, error = %e, "unable to load entities for deletion");
                    report.errors += 1;
                    return report;
                }
            };
            for entity in &entities {
                match store.delete(entity) {
                    Ok(()) => report.deleted += 1,
                    Err(e) => {
                        error!(%entity_type, error = %e, "unable to delete entity");
                        report.errors += 1;
                    }
                }
            }
            info!(%entity_type, deleted = report.deleted, "deleted entities");
            report
        })
        .collect()
}
