//! Create-or-update reconciliation of prepared records against the store

use crate::entity::{ChildRecord, Entity, FieldValue};
use crate::identity::{resolve_id, KeySource};
use crate::schema::{EntityType, FieldKind, KeyPart, LOCK_FIELD};
use crate::store::{EntityStore, Properties};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::AddAssign;
use tracing::{debug, error};

/// A record ready for reconciliation: identity resolved where possible,
/// references linked and values typed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportRecord {
    pub wid: Option<String>,
    pub values: BTreeMap<String, FieldValue>,
    /// Bookkeeping values that are never written to the entity
    pub external: BTreeMap<String, String>,
    /// Auxiliary sub-records saved with the entity, keyed by parent field
    pub children: BTreeMap<String, Vec<ChildRecord>>,
}

impl ImportRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wid(mut self, wid: impl Into<String>) -> Self {
        self.wid = Some(wid.into());
        self
    }

    pub fn with(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.values.insert(field.into(), value);
        self
    }
}

impl KeySource for ImportRecord {
    fn natural_wid(&self) -> Option<&str> {
        self.wid.as_deref().filter(|w| !w.is_empty())
    }

    fn key_part(&self, part: &KeyPart) -> String {
        match part {
            KeyPart::Field(name) => self
                .values
                .get(*name)
                .map(FieldValue::key_string)
                .unwrap_or_default(),
            KeyPart::External(name) => self.external.get(*name).cloned().unwrap_or_default(),
        }
    }
}

/// Outcome counts of one reconciliation batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub saved: usize,
    pub errors: usize,
    pub existing_not_updated: usize,
}

impl AddAssign for BatchResult {
    fn add_assign(&mut self, other: Self) {
        self.saved += other.saved;
        self.errors += other.errors;
        self.existing_not_updated += other.existing_not_updated;
    }
}

/// Create new entities and, when `update_existing` is set, overwrite
/// unlocked existing ones
///
/// Each record costs one store read and at most one write per matching
/// entity. Store failures are counted and logged; the batch always runs to
/// completion.
pub fn upsert<S: EntityStore + ?Sized>(
    store: &mut S,
    entity_type: EntityType,
    records: Vec<ImportRecord>,
    text_format: &str,
    update_existing: bool,
) -> BatchResult {
    let spec = entity_type.spec();
    let mut result = BatchResult::default();

    for mut record in records {
        if record.natural_wid().is_none() {
            record.wid = resolve_id(spec, &record);
        }
        if record.wid.is_none() {
            error!(%entity_type, "record has no identity, not saving");
            result.errors += 1;
            continue;
        }

        let lookup = lookup_properties(entity_type, &record);
        let existing = if lookup.is_empty() {
            Vec::new()
        } else {
            match store.load_by_properties(entity_type, &lookup) {
                Ok(existing) => existing,
                Err(e) => {
                    error!(%entity_type, wid = ?record.wid, error = %e, "existence check failed");
                    result.errors += 1;
                    continue;
                }
            }
        };

        if existing.is_empty() {
            let mut entity = store.create(entity_type);
            apply_values(&mut entity, &record, text_format);
            save(store, &mut entity, &record, &mut result);
            continue;
        }

        if !update_existing {
            result.existing_not_updated += 1;
            continue;
        }

        for mut entity in existing {
            if entity.is_locked() {
                debug!(%entity_type, id = ?entity.id, "entity locked, not updating");
                result.existing_not_updated += 1;
                continue;
            }
            apply_values(&mut entity, &record, text_format);
            save(store, &mut entity, &record, &mut result);
        }
    }

    result
}

/// Uniqueness lookup: the wid when known, else the unique field combination
fn lookup_properties(entity_type: EntityType, record: &ImportRecord) -> Properties {
    let mut properties = Properties::new();
    if let Some(wid) = record.natural_wid() {
        properties.insert("wid".to_string(), FieldValue::text(wid));
        return properties;
    }

    for part in entity_type.spec().unique {
        if let KeyPart::Field(name) = part {
            let value = record.values.get(*name).cloned().unwrap_or(FieldValue::Null);
            properties.insert(name.to_string(), value);
        }
    }
    properties
}

/// Copy a record onto an entity, field by field
fn apply_values(entity: &mut Entity, record: &ImportRecord, text_format: &str) {
    let spec = entity.spec();

    if let Some(wid) = &record.wid {
        entity.set("wid", FieldValue::text(wid.clone()));
    }

    for (field, value) in &record.values {
        if field == "wid" || field == LOCK_FIELD {
            continue;
        }
        let Some(field_spec) = spec.field(field) else {
            continue;
        };
        let value = match (field_spec.kind, value) {
            (FieldKind::LongText, FieldValue::Text(s)) => FieldValue::LongText {
                value: s.clone(),
                format: text_format.to_string(),
            },
            (_, v) => v.clone(),
        };
        entity.set(field, value);
    }

    for (field, children) in &record.children {
        entity.set_children(field, children.clone());
    }
}

fn save<S: EntityStore + ?Sized>(
    store: &mut S,
    entity: &mut Entity,
    record: &ImportRecord,
    result: &mut BatchResult,
) {
    match store.save(entity) {
        Ok(_) => result.saved += 1,
        Err(e) => {
            result.errors += 1;
            error!(
                entity_type = %entity.entity_type,
                wid = ?record.wid,
                error = %e,
                "unable to save entity during import"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;
    use crate::store::{MemoryStore, StoreError, StoreResult};

    fn faction(wid: &str, name: &str) -> ImportRecord {
        ImportRecord::new()
            .with_wid(wid)
            .with("name", FieldValue::text(name))
            .with("link", FieldValue::text(format!("https://example.test/{wid}")))
    }

    #[test]
    fn test_creates_new_entities() {
        let mut store = MemoryStore::new();
        let result = upsert(
            &mut store,
            EntityType::Faction,
            vec![faction("SM", "Space Marines"), faction("NEC", "Necrons")],
            "basic_html",
            false,
        );

        assert_eq!(
            result,
            BatchResult {
                saved: 2,
                errors: 0,
                existing_not_updated: 0
            }
        );
        assert_eq!(store.count(EntityType::Faction), 2);
    }

    #[test]
    fn test_existing_skipped_without_update() {
        let mut store = MemoryStore::new();
        upsert(&mut store, EntityType::Faction, vec![faction("SM", "Space Marines")], "basic_html", false);

        let result = upsert(
            &mut store,
            EntityType::Faction,
            vec![faction("SM", "Adeptus Astartes")],
            "basic_html",
            false,
        );

        assert_eq!(result.saved, 0);
        assert_eq!(result.existing_not_updated, 1);
        assert_eq!(
            store.find_by_wid(EntityType::Faction, "SM").and_then(|e| e.name()),
            Some("Space Marines")
        );
    }

    #[test]
    fn test_update_overwrites_unlocked() {
        let mut store = MemoryStore::new();
        upsert(&mut store, EntityType::Faction, vec![faction("SM", "Space Marines")], "basic_html", false);

        let result = upsert(
            &mut store,
            EntityType::Faction,
            vec![faction("SM", "Adeptus Astartes")],
            "basic_html",
            true,
        );

        assert_eq!(result.saved, 1);
        assert_eq!(store.count(EntityType::Faction), 1);
        assert_eq!(
            store.find_by_wid(EntityType::Faction, "SM").and_then(|e| e.name()),
            Some("Adeptus Astartes")
        );
    }

    #[test]
    fn test_update_respects_lock() {
        let mut store = MemoryStore::new();
        let mut locked = Entity::new(EntityType::Faction)
            .with("wid", FieldValue::text("SM"))
            .with("name", FieldValue::text("My Chapter"));
        locked.set_locked(true);
        store.save(&mut locked).unwrap();

        let result = upsert(
            &mut store,
            EntityType::Faction,
            vec![faction("SM", "Space Marines")],
            "basic_html",
            true,
        );

        assert_eq!(result.saved, 0);
        assert_eq!(result.existing_not_updated, 1);
        let stored = store.find_by_wid(EntityType::Faction, "SM").unwrap();
        assert_eq!(stored.name(), Some("My Chapter"));
        assert!(stored.get("link").is_none());
    }

    #[test]
    fn test_long_text_gets_format_and_unknown_fields_ignored() {
        let mut store = MemoryStore::new();
        let record = ImportRecord::new()
            .with_wid("AB1")
            .with("name", FieldValue::text("And They Shall Know No Fear"))
            .with("description", FieldValue::text("<p>Re-roll</p>"))
            .with("cp_cost", FieldValue::text("1"));

        upsert(&mut store, EntityType::Ability, vec![record], "full_html", false);

        let stored = store.find_by_wid(EntityType::Ability, "AB1").unwrap();
        assert_eq!(
            stored.get("description"),
            Some(&FieldValue::LongText {
                value: "<p>Re-roll</p>".into(),
                format: "full_html".into()
            })
        );
        assert!(stored.get("cp_cost").is_none());
    }

    #[test]
    fn test_missing_wid_is_derived() {
        let mut store = MemoryStore::new();
        let record = ImportRecord::new()
            .with("name", FieldValue::text("Iron Will"))
            .with("faction_id", FieldValue::Reference(1));

        let first = upsert(&mut store, EntityType::WarlordTrait, vec![record.clone()], "basic_html", false);
        let second = upsert(&mut store, EntityType::WarlordTrait, vec![record], "basic_html", false);

        assert_eq!(first.saved, 1);
        assert_eq!(second.existing_not_updated, 1);
        let stored = store.load_multiple(EntityType::WarlordTrait).unwrap();
        assert!(stored[0].wid().unwrap().starts_with("SH-"));
    }

    #[test]
    fn test_record_without_identity_is_rejected() {
        let mut store = MemoryStore::new();
        let orks = ImportRecord::new().with("name", FieldValue::text("Orks"));
        let tyranids = ImportRecord::new().with("name", FieldValue::text("Tyranids"));

        let first = upsert(&mut store, EntityType::Faction, vec![orks], "basic_html", false);
        let second = upsert(&mut store, EntityType::Faction, vec![tyranids], "basic_html", true);

        assert_eq!(first.errors, 1);
        assert_eq!(second.errors, 1);
        assert_eq!(first.saved + second.saved, 0);
        assert_eq!(store.count(EntityType::Faction), 0);
    }

    #[test]
    fn test_update_clears_dropped_children() {
        let mut store = MemoryStore::new();
        let mut rows = BTreeMap::new();
        rows.insert(
            "damage_table".to_string(),
            vec![ChildRecord::new("damage").with("wounds", "9-16+")],
        );
        let record = ImportRecord {
            children: rows,
            ..ImportRecord::new().with_wid("LR-1")
        };
        upsert(&mut store, EntityType::Model, vec![record], "basic_html", false);

        let mut emptied = BTreeMap::new();
        emptied.insert("damage_table".to_string(), Vec::new());
        let record = ImportRecord {
            children: emptied,
            ..ImportRecord::new().with_wid("LR-1")
        };
        let result = upsert(&mut store, EntityType::Model, vec![record], "basic_html", true);

        assert_eq!(result.saved, 1);
        let stored = store.find_by_wid(EntityType::Model, "LR-1").unwrap();
        assert!(stored.children.is_empty());
    }

    struct FailingLookup;

    impl EntityStore for FailingLookup {
        fn load_by_properties(
            &self,
            entity_type: EntityType,
            _properties: &Properties,
        ) -> StoreResult<Vec<Entity>> {
            Err(StoreError::Query {
                entity_type,
                message: "connection lost".into(),
            })
        }

        fn save(&mut self, _entity: &mut Entity) -> StoreResult<EntityId> {
            panic!("nothing should be saved after a failed lookup");
        }

        fn delete(&mut self, _entity: &Entity) -> StoreResult<()> {
            Ok(())
        }

        fn load_multiple(&self, _entity_type: EntityType) -> StoreResult<Vec<Entity>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_failed_lookup_counts_error_and_continues() {
        let mut store = FailingLookup;
        let result = upsert(
            &mut store,
            EntityType::Faction,
            vec![faction("SM", "Space Marines"), faction("NEC", "Necrons")],
            "basic_html",
            false,
        );

        assert_eq!(
            result,
            BatchResult {
                saved: 0,
                errors: 2,
                existing_not_updated: 0
            }
        );
    }

    #[test]
    fn test_import_never_touches_lock_flag() {
        let mut store = MemoryStore::new();
        let record = faction("SM", "Space Marines").with("avoid_update", FieldValue::Boolean(true));

        upsert(&mut store, EntityType::Faction, vec![record], "basic_html", false);

        assert!(!store.find_by_wid(EntityType::Faction, "SM").unwrap().is_locked());
    }
}
