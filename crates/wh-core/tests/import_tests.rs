//! End-to-end import runs against an in-memory store

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use wh_core::{
    parse_csv_str, wid_from_string, ColumnMapping, Entity, EntityStore, EntityType, FieldValue,
    ImportOptions, ImportRun, ImportSummary, MemoryStore, ParseOptions, Properties, StoreError,
    StoreResult,
};

const SOURCE: &str = "id|name|type|edition|version|errata_date|errata_link|\n\
    000000001|Codex: Space Marines|Codex|9th|1.2|03.06.2021 00:00:00|https://example.test/errata|\n";

const FACTIONS: &str = "id|name|link|\n\
    SM|Space Marines|https://example.test/factions/space-marines|\n\
    NEC|Necrons|https://example.test/factions/necrons|\n";

const DATASHEETS: &str = "id|name|link|faction_id|source_id|role|\n\
    000000101|Captain|https://example.test/captain|SM|000000001|HQ|\n\
    000000102|Land Raider|https://example.test/land-raider|SM|000000001|Heavy Support|\n";

const MODELS: &str = "datasheet_id|line|name|M|WS|BS|S|T|W|A|Ld|Sv|cost|\n\
    000000101|1|Captain|6\"|2+|2+|4|4|5|4|9|3+|80|\n\
    000000102|1|Land Raider|10\"|6+|3+|8|8|16|6|9|2+|240|\n";

const DAMAGE: &str = "datasheet_id|line|Col1|Col2|Col3|Col4|\n\
    000000102|0|RemainingW|BS|A||\n\
    000000102|1|9-16+|3+|6||\n\
    000000102|2|5-8|4+|D6||\n\
    000000102|3|1-4|5+|1||\n";

const KEYWORDS: &str = "datasheet_id|keyword|model|is_faction_keyword|\n\
    000000101|Infantry|Captain|false|\n\
    000000101|Adeptus Astartes||true|\n\
    000000102|Vehicle|Land Raider|false|\n";

const STRATAGEMS: &str = "faction_id|name|type|cp_cost|legend|source_id|id|description|\n\
    SM|Armour of Contempt|Battle Tactic Stratagem|1|Their faith is their shield.|000000001|000001|<p>Use this Stratagem.</p>|\n\
    NEC|Protocol of the Undying Legions|Strategic Ploy Stratagem|2||000000001|000002|<p>Reanimate.</p>|\n";

/// Write the fixture exports and return the source map for them
fn write_exports(dir: &Path) -> BTreeMap<String, PathBuf> {
    let files = [
        ("source", "Source.csv", SOURCE),
        ("faction", "Factions.csv", FACTIONS),
        ("datasheet", "Datasheets.csv", DATASHEETS),
        ("model", "Datasheets_models.csv", MODELS),
        ("datasheet_damage", "Datasheets_damage.csv", DAMAGE),
        ("keyword", "Datasheets_keywords.csv", KEYWORDS),
        ("stratagem", "Stratagems.csv", STRATAGEMS),
    ];

    files
        .iter()
        .map(|(source, file, content)| {
            let path = dir.join(file);
            fs::write(&path, content).unwrap();
            (source.to_string(), path)
        })
        .collect()
}

fn import(
    store: &mut impl EntityStore,
    sources: &BTreeMap<String, PathBuf>,
    options: ImportOptions,
) -> ImportSummary {
    ImportRun::new(sources, options).unwrap().run(store)
}

fn wids(store: &MemoryStore, entity_type: EntityType) -> Vec<String> {
    let mut wids: Vec<String> = store
        .load_multiple(entity_type)
        .unwrap()
        .iter()
        .filter_map(|e| e.wid().map(str::to_string))
        .collect();
    wids.sort();
    wids
}

/// Store that refuses to save entities with one particular name
struct RejectingStore {
    inner: MemoryStore,
    rejected_name: &'static str,
}

impl EntityStore for RejectingStore {
    fn load_by_properties(
        &self,
        entity_type: EntityType,
        properties: &Properties,
    ) -> StoreResult<Vec<Entity>> {
        self.inner.load_by_properties(entity_type, properties)
    }

    fn save(&mut self, entity: &mut Entity) -> StoreResult<u64> {
        if entity.name() == Some(self.rejected_name) {
            return Err(StoreError::Save {
                entity_type: entity.entity_type,
                key: entity.wid().unwrap_or_default().to_string(),
                message: "rejected by test store".into(),
            });
        }
        self.inner.save(entity)
    }

    fn delete(&mut self, entity: &Entity) -> StoreResult<()> {
        self.inner.delete(entity)
    }

    fn load_multiple(&self, entity_type: EntityType) -> StoreResult<Vec<Entity>> {
        self.inner.load_multiple(entity_type)
    }
}

#[test]
fn test_full_import() {
    let dir = tempfile::tempdir().unwrap();
    let sources = write_exports(dir.path());
    let mut store = MemoryStore::new();

    let summary = import(&mut store, &sources, ImportOptions::default());

    assert!(summary.source_errors.is_empty());
    assert_eq!(summary.totals().errors, 0);
    let order: Vec<EntityType> = summary.types.iter().map(|t| t.entity_type).collect();
    assert_eq!(
        order,
        vec![
            EntityType::Source,
            EntityType::Faction,
            EntityType::Stratagem,
            EntityType::Keyword,
            EntityType::Model,
            EntityType::Datasheet,
        ]
    );

    let source = store.find_by_wid(EntityType::Source, "000000001").unwrap();
    assert_eq!(
        source.get("errata_date"),
        Some(&FieldValue::Date(NaiveDate::from_ymd_opt(2021, 6, 3).unwrap()))
    );

    let sm = store.find_by_wid(EntityType::Faction, "SM").unwrap().id.unwrap();

    let keyword = store
        .find_by_wid(EntityType::Keyword, &wid_from_string("Adeptus Astartes-SM"))
        .unwrap();
    assert_eq!(keyword.get("faction_id"), Some(&FieldValue::Reference(sm)));
    assert_eq!(keyword.get("is_faction_keyword"), Some(&FieldValue::Boolean(true)));

    let stratagem = store
        .find_by_wid(
            EntityType::Stratagem,
            &wid_from_string("Armour of Contempt-Battle Tactic Stratagem-SM"),
        )
        .unwrap();
    assert_eq!(
        stratagem.get("description"),
        Some(&FieldValue::LongText {
            value: "<p>Use this Stratagem.</p>".into(),
            format: "basic_html".into()
        })
    );

    let land_raider = store
        .find_by_wid(EntityType::Model, &wid_from_string("000000102-1"))
        .unwrap();
    assert_eq!(land_raider.children["damage_table"].len(), 6);
    let captain = store
        .find_by_wid(EntityType::Model, &wid_from_string("000000101-1"))
        .unwrap();
    assert!(captain.children.is_empty());

    let datasheet = store.find_by_wid(EntityType::Datasheet, "000000102").unwrap();
    assert_eq!(datasheet.get("faction_id"), Some(&FieldValue::Reference(sm)));
    assert_eq!(
        datasheet.get("models"),
        Some(&FieldValue::References(vec![land_raider.id.unwrap()]))
    );
}

#[test]
fn test_reimport_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let sources = write_exports(dir.path());
    let mut store = MemoryStore::new();

    let first = import(&mut store, &sources, ImportOptions::default());
    let counts: Vec<usize> = EntityType::ALL.iter().map(|t| store.count(*t)).collect();
    let second = import(&mut store, &sources, ImportOptions::default());

    for t in &second.types {
        let before = first.get(t.entity_type).unwrap();
        assert_eq!(t.saved, 0, "{}", t.entity_type);
        assert_eq!(t.existing_not_updated, before.saved, "{}", t.entity_type);
    }
    let after: Vec<usize> = EntityType::ALL.iter().map(|t| store.count(*t)).collect();
    assert_eq!(counts, after);
}

#[test]
fn test_update_run_creates_no_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let sources = write_exports(dir.path());
    let mut store = MemoryStore::new();
    let options = ImportOptions {
        update_existing: true,
        ..ImportOptions::default()
    };

    let first = import(&mut store, &sources, options.clone());
    let second = import(&mut store, &sources, options);

    assert_eq!(first.totals().saved, second.totals().saved);
    assert_eq!(second.totals().existing_not_updated, 0);
    assert_eq!(store.count(EntityType::Keyword), 3);
}

#[test]
fn test_derived_identity_is_stable_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let sources = write_exports(dir.path());

    let mut a = MemoryStore::new();
    let mut b = MemoryStore::new();
    import(&mut a, &sources, ImportOptions::default());
    // A separate store sees different surrogate ids, but the same wids
    b.save(&mut Entity::new(EntityType::Faction).with("wid", FieldValue::text("XX")))
        .unwrap();
    import(&mut b, &sources, ImportOptions::default());

    for t in [EntityType::Stratagem, EntityType::Keyword, EntityType::Model] {
        assert_eq!(wids(&a, t), wids(&b, t), "{t}");
    }
    assert!(wids(&a, EntityType::Keyword).contains(&wid_from_string("Infantry-SM")));
}

#[test]
fn test_mapping_fidelity() {
    let mapping = ColumnMapping::new().map("id", "wid").map("name", "name");
    let set = parse_csv_str(
        "id|name|extra_unused\n7|Ultramarines|ignored\n",
        "chapters.csv",
        Some(&mapping),
        &ParseOptions::default(),
    )
    .unwrap();

    let record = &set.records[0];
    assert_eq!(record.fields.len(), 2);
    assert_eq!(record.get("wid"), Some("7"));
    assert_eq!(record.get("name"), Some("Ultramarines"));
    assert_eq!(record.get("extra_unused"), None);
    assert!(record.external.is_empty());
}

#[test]
fn test_update_respects_lock() {
    let dir = tempfile::tempdir().unwrap();
    let mut sources = write_exports(dir.path());
    let mut store = MemoryStore::new();
    import(&mut store, &sources, ImportOptions::default());

    let mut sm = store.find_by_wid(EntityType::Faction, "SM").unwrap().clone();
    sm.set("name", FieldValue::text("Ultramarines"));
    sm.set_locked(true);
    store.save(&mut sm).unwrap();

    let renamed = dir.path().join("Factions_renamed.csv");
    fs::write(
        &renamed,
        "id|name|link|\nSM|Adeptus Astartes|https://example.test/new|\nNEC|Necrontyr|https://example.test/new|\n",
    )
    .unwrap();
    sources.insert("faction".into(), renamed);

    let summary = import(
        &mut store,
        &sources,
        ImportOptions {
            update_existing: true,
            ..ImportOptions::default()
        },
    );

    let faction = summary.get(EntityType::Faction).unwrap();
    assert_eq!(faction.saved, 1);
    assert_eq!(faction.existing_not_updated, 1);
    let locked = store.find_by_wid(EntityType::Faction, "SM").unwrap();
    assert_eq!(locked.name(), Some("Ultramarines"));
    assert_eq!(
        locked.get("link"),
        Some(&FieldValue::text("https://example.test/factions/space-marines"))
    );
    assert_eq!(
        store.find_by_wid(EntityType::Faction, "NEC").unwrap().name(),
        Some("Necrontyr")
    );
}

#[test]
fn test_dependency_order() {
    let dir = tempfile::tempdir().unwrap();
    let all = write_exports(dir.path());
    let sources: BTreeMap<String, PathBuf> = all
        .into_iter()
        .filter(|(name, _)| name == "faction" || name == "stratagem")
        .collect();

    let mut ordered = MemoryStore::new();
    import(&mut ordered, &sources, ImportOptions::default());
    let resolved = ordered
        .load_multiple(EntityType::Stratagem)
        .unwrap()
        .iter()
        .filter(|s| matches!(s.get("faction_id"), Some(FieldValue::Reference(_))))
        .count();
    assert_eq!(resolved, 2);

    let mut reversed = MemoryStore::new();
    let mut order = EntityType::ALL.to_vec();
    order.reverse();
    import(
        &mut reversed,
        &sources,
        ImportOptions {
            order,
            ..ImportOptions::default()
        },
    );
    let stratagems = reversed.load_multiple(EntityType::Stratagem).unwrap();
    assert_eq!(stratagems.len(), 2);
    assert!(stratagems
        .iter()
        .all(|s| s.get("faction_id") == Some(&FieldValue::Null)));
}

#[test]
fn test_chunking() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Factions.csv");
    let mut content = String::from("id|name|link|\n");
    for i in 1..=7 {
        content.push_str(&format!("F{i}|Faction {i}||\n"));
    }
    fs::write(&path, content).unwrap();
    let sources = BTreeMap::from([("faction".to_string(), path)]);

    let mut run = ImportRun::new(
        &sources,
        ImportOptions {
            chunk_size: 3,
            ..ImportOptions::default()
        },
    )
    .unwrap();
    let mut store = MemoryStore::new();

    let mut sizes = Vec::new();
    while let Some(report) = run.step(&mut store) {
        sizes.push(report.records);
    }

    assert_eq!(sizes, vec![3, 3, 1]);
    let faction = run.summary().get(EntityType::Faction).unwrap();
    assert_eq!(faction.chunks, 3);
    assert_eq!(faction.records, 7);
}

#[test]
fn test_error_isolation() {
    let dir = tempfile::tempdir().unwrap();
    let mut sources = write_exports(dir.path());
    let factions = dir.path().join("Factions_five.csv");
    fs::write(
        &factions,
        "id|name|link|\nSM|Space Marines||\nBAD|Bad||\nNEC|Necrons||\nORK|Orks||\nTAU|T'au Empire||\n",
    )
    .unwrap();
    sources.insert("faction".into(), factions);

    let mut store = RejectingStore {
        inner: MemoryStore::new(),
        rejected_name: "Bad",
    };
    let summary = import(&mut store, &sources, ImportOptions::default());

    let faction = summary.get(EntityType::Faction).unwrap();
    assert_eq!(faction.saved, 4);
    assert_eq!(faction.errors, 1);
    assert_eq!(store.inner.count(EntityType::Faction), 4);
    // Later entity types still ran
    assert_eq!(store.inner.count(EntityType::Datasheet), 2);
}
