//! Turns parsed rows of one entity type into records ready for reconciliation
//!
//! Preparation (inherit, identity, dedup) works on raw values only, so the
//! resulting wids do not depend on what the store already holds. Linking runs
//! per chunk against the store.

use crate::auxiliary::{DamageTables, DAMAGE_FIELD};
use crate::entity::{ChildRecord, FieldValue};
use crate::identity::resolve_id;
use crate::linker::LinkCache;
use crate::reconcile::ImportRecord;
use crate::record::{RawRecord, RecordSet};
use crate::schema::{AuxiliaryKind, EntityType, FieldKind};
use crate::store::EntityStore;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use tracing::{debug, warn};

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d.%m.%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%d.%m.%Y %H:%M:%S"];

/// Other parsed sources an entity type may draw on while importing
#[derive(Debug, Clone, Copy, Default)]
pub struct Enrichment<'a> {
    /// Records of the parent type named by the inherit rule
    pub parents: Option<&'a RecordSet>,
    /// Records of the child type named by the gather rule
    pub children: Option<&'a RecordSet>,
    pub damage: Option<&'a DamageTables>,
}

/// Output of [`prepare`]
#[derive(Debug, Clone, Default)]
pub struct Prepared {
    /// Unique by wid, in first-seen order
    pub records: Vec<RawRecord>,
    /// Rows dropped because no identity could be derived
    pub unidentified: usize,
    /// Rows folded into an earlier row with the same wid
    pub duplicates: usize,
}

/// Interpret a raw boolean flag
pub fn parse_boolean(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

/// Parse an upstream date, with or without a time part
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
                .map(|dt| dt.date())
        })
}

/// Coerce a raw value for a scalar field kind
///
/// Reference kinds are left as text; the linker replaces them.
pub fn coerce(kind: FieldKind, raw: &str) -> FieldValue {
    match kind {
        FieldKind::Boolean if raw.trim().is_empty() => FieldValue::Null,
        FieldKind::Boolean => FieldValue::Boolean(parse_boolean(raw)),
        FieldKind::Date if raw.trim().is_empty() => FieldValue::Null,
        FieldKind::Date => parse_date(raw)
            .map(FieldValue::Date)
            .unwrap_or_else(|| FieldValue::text(raw)),
        _ => FieldValue::text(raw),
    }
}

/// Apply inherit rules, resolve identity and deduplicate by wid
pub fn prepare(
    entity_type: EntityType,
    set: &RecordSet,
    enrichment: &Enrichment<'_>,
    cache: &mut LinkCache,
) -> Prepared {
    let spec = entity_type.spec();
    let mut prepared = Prepared::default();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for record in &set.records {
        let mut record = record.clone();

        if let Some(rule) = spec.inherit {
            if record.get_non_empty(rule.field).is_none() {
                let inherited = record.get_external(rule.external).and_then(|parent_wid| {
                    cache.inherited_value(rule.parent, enrichment.parents, parent_wid, rule.field)
                });
                if let Some(value) = inherited {
                    record.set(rule.field, value);
                }
            }
        }

        let Some(wid) = resolve_id(spec, &record) else {
            warn!(%entity_type, "skipping record without identity");
            prepared.unidentified += 1;
            continue;
        };
        record.set("wid", wid.clone());

        match positions.get(&wid) {
            Some(&position) => {
                prepared.records[position] = record;
                prepared.duplicates += 1;
            }
            None => {
                positions.insert(wid, prepared.records.len());
                prepared.records.push(record);
            }
        }
    }

    if prepared.duplicates > 0 {
        debug!(%entity_type, duplicates = prepared.duplicates, "merged duplicate records");
    }
    prepared
}

/// Type the values of prepared records and resolve their references
///
/// Only fields present in the source are carried, so an update never blanks
/// a field its source does not provide.
pub fn link<S: EntityStore + ?Sized>(
    store: &S,
    entity_type: EntityType,
    records: &[RawRecord],
    enrichment: &Enrichment<'_>,
    cache: &mut LinkCache,
) -> Vec<ImportRecord> {
    let spec = entity_type.spec();

    records
        .iter()
        .map(|record| {
            let wid = record.wid().map(str::to_string);
            let mut out = ImportRecord {
                wid: wid.clone(),
                external: record.external.clone(),
                ..ImportRecord::default()
            };

            for field in spec.imported_fields() {
                if field.name == "wid" {
                    continue;
                }
                let value = match field.kind {
                    FieldKind::Reference(target) => {
                        let Some(raw) = record.get(field.name) else {
                            continue;
                        };
                        link_reference(store, cache, entity_type, target, field.name, raw)
                    }
                    FieldKind::ReferenceList(target) => {
                        let (Some(rule), Some(children), Some(wid)) =
                            (spec.gather, enrichment.children, wid.as_deref())
                        else {
                            continue;
                        };
                        if rule.field != field.name {
                            continue;
                        }
                        let ids = cache
                            .child_wids(rule.child, children, rule.external, wid)
                            .iter()
                            .filter_map(|child| cache.resolve_reference(store, target, "wid", child))
                            .collect();
                        FieldValue::References(ids)
                    }
                    kind => match record.get(field.name) {
                        Some(raw) => coerce(kind, raw),
                        None => continue,
                    },
                };
                out.values.insert(field.name.to_string(), value);
            }

            if spec.auxiliary == Some(AuxiliaryKind::DatasheetDamage) {
                if let Some(damage) = enrichment.damage {
                    let rows = damage_rows(record, damage).unwrap_or_default();
                    out.children.insert(DAMAGE_FIELD.to_string(), rows);
                }
            }

            out
        })
        .collect()
}

fn link_reference<S: EntityStore + ?Sized>(
    store: &S,
    cache: &mut LinkCache,
    entity_type: EntityType,
    target: EntityType,
    field: &str,
    raw: &str,
) -> FieldValue {
    if raw.trim().is_empty() {
        return FieldValue::Null;
    }
    match cache.resolve_reference(store, target, "wid", raw) {
        Some(id) => FieldValue::Reference(id),
        None => {
            warn!(%entity_type, field, value = raw, %target, "unresolved reference");
            FieldValue::Null
        }
    }
}

/// Damage rows for a model; the table being loaded means an empty result
/// clears rows stored by an earlier run
fn damage_rows(record: &RawRecord, damage: &DamageTables) -> Option<Vec<ChildRecord>> {
    let datasheet_id = record.get_external("datasheet_id")?;
    let line = record.get_external("line").unwrap_or_default();
    let name = record.get("name").unwrap_or_default();
    damage.children_for(datasheet_id, name, line)
}
