//! Static per-type descriptions of the imported entities
//!
//! Each entity type is a data value ([`EntityTypeSpec`]) consumed by the
//! shared pipeline: the column mapping, the fields that make a record unique
//! and the enrichment rules (inherit from a parent, gather children, fold an
//! auxiliary source in) all live here.

use crate::error::Error;
use crate::mapping::ColumnMapping;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One category of imported record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Source,
    Faction,
    Ability,
    Stratagem,
    Keyword,
    Wargear,
    WarlordTrait,
    PsychicPower,
    Model,
    Datasheet,
}

impl EntityType {
    /// All entity types in dependency order
    pub const ALL: [EntityType; 10] = [
        EntityType::Source,
        EntityType::Faction,
        EntityType::Ability,
        EntityType::Stratagem,
        EntityType::Keyword,
        EntityType::Wargear,
        EntityType::WarlordTrait,
        EntityType::PsychicPower,
        EntityType::Model,
        EntityType::Datasheet,
    ];

    /// Machine name used in configuration and messages
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Source => "source",
            EntityType::Faction => "faction",
            EntityType::Ability => "ability",
            EntityType::Stratagem => "stratagem",
            EntityType::Keyword => "keyword",
            EntityType::Wargear => "wargear",
            EntityType::WarlordTrait => "warlord_trait",
            EntityType::PsychicPower => "psychic_power",
            EntityType::Model => "model",
            EntityType::Datasheet => "datasheet",
        }
    }

    /// The static description of this type
    pub fn spec(self) -> &'static EntityTypeSpec {
        match self {
            EntityType::Source => &SOURCE,
            EntityType::Faction => &FACTION,
            EntityType::Ability => &ABILITY,
            EntityType::Stratagem => &STRATAGEM,
            EntityType::Keyword => &KEYWORD,
            EntityType::Wargear => &WARGEAR,
            EntityType::WarlordTrait => &WARLORD_TRAIT,
            EntityType::PsychicPower => &PSYCHIC_POWER,
            EntityType::Model => &MODEL,
            EntityType::Datasheet => &DATASHEET,
        }
    }

    /// Standard upstream file name for this type's source
    pub fn default_file_name(self) -> &'static str {
        match self {
            EntityType::Source => "Source.csv",
            EntityType::Faction => "Factions.csv",
            EntityType::Ability => "Abilities.csv",
            EntityType::Stratagem => "Stratagems.csv",
            EntityType::Keyword => "Datasheets_keywords.csv",
            EntityType::Wargear => "Wargear.csv",
            EntityType::WarlordTrait => "Warlord_traits.csv",
            EntityType::PsychicPower => "PsychicPowers.csv",
            EntityType::Model => "Datasheets_models.csv",
            EntityType::Datasheet => "Datasheets.csv",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == name)
            .ok_or_else(|| Error::UnknownEntityType(s.to_string()))
    }
}

/// Sources merged into another type's import rather than imported directly
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxiliaryKind {
    /// Degrading characteristics per wound bracket, folded into models
    DatasheetDamage,
}

impl AuxiliaryKind {
    pub const ALL: [AuxiliaryKind; 1] = [AuxiliaryKind::DatasheetDamage];

    pub fn as_str(self) -> &'static str {
        match self {
            AuxiliaryKind::DatasheetDamage => "datasheet_damage",
        }
    }

    pub fn default_file_name(self) -> &'static str {
        match self {
            AuxiliaryKind::DatasheetDamage => "Datasheets_damage.csv",
        }
    }
}

impl fmt::Display for AuxiliaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured source, classified as entity-bound or auxiliary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKey {
    Entity(EntityType),
    Auxiliary(AuxiliaryKind),
}

impl SourceKey {
    /// Every known source, entity-bound ones first
    pub fn all() -> Vec<SourceKey> {
        EntityType::ALL
            .into_iter()
            .map(SourceKey::Entity)
            .chain(AuxiliaryKind::ALL.into_iter().map(SourceKey::Auxiliary))
            .collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKey::Entity(t) => t.as_str(),
            SourceKey::Auxiliary(a) => a.as_str(),
        }
    }

    pub fn default_file_name(self) -> &'static str {
        match self {
            SourceKey::Entity(t) => t.default_file_name(),
            SourceKey::Auxiliary(a) => a.default_file_name(),
        }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        SourceKey::all()
            .into_iter()
            .find(|k| k.as_str() == name)
            .ok_or_else(|| Error::UnknownSource(s.to_string()))
    }
}

/// Semantic type of an entity field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Short single-line text
    Text,
    /// Long text stored with a text-format tag
    LongText,
    Boolean,
    Date,
    /// Reference to one entity of the target type, looked up by `wid`
    Reference(EntityType),
    /// References to several entities of the target type
    ReferenceList(EntityType),
}

/// An additional field of an entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    /// CSV column feeding this field, if any
    pub column: Option<&'static str>,
}

impl FieldSpec {
    const fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            column: Some(name),
        }
    }

    pub const fn text(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Text)
    }

    pub const fn long_text(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::LongText)
    }

    pub const fn boolean(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Boolean)
    }

    pub const fn date(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Date)
    }

    pub const fn reference(name: &'static str, label: &'static str, target: EntityType) -> Self {
        Self::new(name, label, FieldKind::Reference(target))
    }

    /// A list of references filled during import, never read from CSV
    pub const fn references(name: &'static str, label: &'static str, target: EntityType) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::ReferenceList(target),
            column: None,
        }
    }
}

/// One component of a uniqueness key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPart {
    /// A mapped field of the record
    Field(&'static str),
    /// A value from the record's external side-channel
    External(&'static str),
}

/// Copy a raw field from a parent record found in the parent's own source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inherit {
    /// External key on the child holding the parent's wid
    pub external: &'static str,
    pub parent: EntityType,
    /// Field copied from the parent into the child
    pub field: &'static str,
}

/// Collect references to the child records that point at this record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gather {
    pub child: EntityType,
    /// External key on the child holding this record's wid
    pub external: &'static str,
    /// Reference-list field receiving the children
    pub field: &'static str,
}

/// Base fields every entity carries
pub const BASE_FIELDS: [FieldSpec; 3] = [
    FieldSpec::text("wid", "Wahapedia ID"),
    FieldSpec::text("name", "Name"),
    FieldSpec::boolean("avoid_update", "Avoid update"),
];

/// Field holding the import lock flag
pub const LOCK_FIELD: &str = "avoid_update";

/// Static description of one entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityTypeSpec {
    pub entity_type: EntityType,
    pub label: &'static str,
    /// Whether the CSV `id` column is the upstream natural key
    pub natural_key: bool,
    /// Column renames beyond the field-name defaults
    pub renames: &'static [(&'static str, &'static str)],
    /// External allow-list
    pub external: &'static [&'static str],
    /// Fields that together identify a record
    pub unique: &'static [KeyPart],
    pub fields: &'static [FieldSpec],
    pub inherit: Option<Inherit>,
    pub gather: Option<Gather>,
    pub auxiliary: Option<AuxiliaryKind>,
}

impl EntityTypeSpec {
    /// Build the CSV column mapping for this type
    pub fn mapping(&self) -> ColumnMapping {
        let mut mapping = ColumnMapping::new();
        if self.natural_key {
            mapping = mapping.map("id", "wid");
        }
        for (column, field) in self.renames {
            mapping = mapping.map(*column, *field);
        }
        if !mapping.maps_to("name") {
            mapping = mapping.map("name", "name");
        }
        for field in self.fields {
            if let Some(column) = field.column {
                if !mapping.maps_to(field.name) {
                    mapping = mapping.map(column, field.name);
                }
            }
        }
        for column in self.external {
            mapping = mapping.external(*column);
        }
        mapping
    }

    /// Look up a base or additional field
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        BASE_FIELDS
            .iter()
            .chain(self.fields.iter())
            .find(|f| f.name == name)
    }

    /// Whether entities of this type carry the field
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Fields importable from a record: base fields first, then additional
    pub fn imported_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        BASE_FIELDS
            .iter()
            .filter(|f| f.name != LOCK_FIELD)
            .chain(self.fields.iter())
    }
}

const NATURAL: &[KeyPart] = &[KeyPart::Field("wid")];
const NAME_AND_FACTION: &[KeyPart] = &[KeyPart::Field("name"), KeyPart::Field("faction_id")];

static SOURCE: EntityTypeSpec = EntityTypeSpec {
    entity_type: EntityType::Source,
    label: "Source",
    natural_key: true,
    renames: &[],
    external: &[],
    unique: NATURAL,
    fields: &[
        FieldSpec::text("type", "Type"),
        FieldSpec::text("edition", "Edition"),
        FieldSpec::text("version", "Version"),
        FieldSpec::date("errata_date", "Errata Date"),
        FieldSpec::text("errata_link", "Errata Link"),
    ],
    inherit: None,
    gather: None,
    auxiliary: None,
};

static FACTION: EntityTypeSpec = EntityTypeSpec {
    entity_type: EntityType::Faction,
    label: "Faction",
    natural_key: true,
    renames: &[],
    external: &[],
    unique: NATURAL,
    fields: &[FieldSpec::text("link", "Link")],
    inherit: None,
    gather: None,
    auxiliary: None,
};

static ABILITY: EntityTypeSpec = EntityTypeSpec {
    entity_type: EntityType::Ability,
    label: "Ability",
    natural_key: true,
    renames: &[],
    external: &[],
    unique: NATURAL,
    fields: &[
        FieldSpec::text("type", "Type"),
        FieldSpec::reference("faction_id", "Faction ID", EntityType::Faction),
        FieldSpec::long_text("description", "Description"),
        FieldSpec::long_text("legend", "Legend"),
    ],
    inherit: None,
    gather: None,
    auxiliary: None,
};

static STRATAGEM: EntityTypeSpec = EntityTypeSpec {
    entity_type: EntityType::Stratagem,
    label: "Stratagem",
    natural_key: false,
    renames: &[],
    external: &[],
    // The same name can exist in several factions
    unique: &[
        KeyPart::Field("name"),
        KeyPart::Field("type"),
        KeyPart::Field("faction_id"),
    ],
    fields: &[
        FieldSpec::text("type", "Type"),
        FieldSpec::text("cp_cost", "CP Cost"),
        FieldSpec::long_text("legend", "Legend"),
        FieldSpec::long_text("description", "Description"),
        FieldSpec::reference("faction_id", "Faction ID", EntityType::Faction),
        FieldSpec::reference("source_id", "Source ID", EntityType::Source),
    ],
    inherit: None,
    gather: None,
    auxiliary: None,
};

static KEYWORD: EntityTypeSpec = EntityTypeSpec {
    entity_type: EntityType::Keyword,
    label: "Keyword",
    natural_key: false,
    renames: &[("keyword", "name")],
    external: &["datasheet_id"],
    unique: NAME_AND_FACTION,
    fields: &[
        FieldSpec::text("model", "Model"),
        FieldSpec {
            name: "faction_id",
            label: "Faction ID",
            kind: FieldKind::Reference(EntityType::Faction),
            column: None,
        },
        FieldSpec::boolean("is_faction_keyword", "Faction keyword"),
    ],
    inherit: Some(Inherit {
        external: "datasheet_id",
        parent: EntityType::Datasheet,
        field: "faction_id",
    }),
    gather: None,
    auxiliary: None,
};

static WARGEAR: EntityTypeSpec = EntityTypeSpec {
    entity_type: EntityType::Wargear,
    label: "Wargear",
    natural_key: true,
    renames: &[],
    external: &[],
    unique: NATURAL,
    fields: &[
        FieldSpec::text("type", "Type"),
        FieldSpec::long_text("description", "Description"),
        FieldSpec::reference("source_id", "Source ID", EntityType::Source),
        FieldSpec::boolean("is_relic", "Relic"),
        FieldSpec::reference("faction_id", "Faction ID", EntityType::Faction),
        FieldSpec::long_text("legend", "Legend"),
    ],
    inherit: None,
    gather: None,
    auxiliary: None,
};

static WARLORD_TRAIT: EntityTypeSpec = EntityTypeSpec {
    entity_type: EntityType::WarlordTrait,
    label: "Warlord Trait",
    natural_key: false,
    renames: &[],
    external: &[],
    unique: NAME_AND_FACTION,
    fields: &[
        FieldSpec::reference("faction_id", "Faction ID", EntityType::Faction),
        FieldSpec::text("type", "Type"),
        FieldSpec::long_text("legend", "Legend"),
        FieldSpec::long_text("description", "Description"),
        FieldSpec::text("roll", "Roll"),
    ],
    inherit: None,
    gather: None,
    auxiliary: None,
};

static PSYCHIC_POWER: EntityTypeSpec = EntityTypeSpec {
    entity_type: EntityType::PsychicPower,
    label: "Psychic Power",
    natural_key: false,
    renames: &[],
    external: &[],
    unique: NAME_AND_FACTION,
    fields: &[
        FieldSpec::text("roll", "Roll"),
        FieldSpec::text("type", "Type"),
        FieldSpec::long_text("description", "Description"),
        FieldSpec::reference("faction_id", "Faction ID", EntityType::Faction),
        FieldSpec::long_text("legend", "Legend"),
    ],
    inherit: None,
    gather: None,
    auxiliary: None,
};

static MODEL: EntityTypeSpec = EntityTypeSpec {
    entity_type: EntityType::Model,
    label: "Model",
    natural_key: false,
    renames: &[],
    external: &["datasheet_id", "line"],
    unique: &[KeyPart::External("datasheet_id"), KeyPart::External("line")],
    fields: &[
        FieldSpec::text("M", "M"),
        FieldSpec::text("WS", "WS"),
        FieldSpec::text("BS", "BS"),
        FieldSpec::text("S", "S"),
        FieldSpec::text("T", "T"),
        FieldSpec::text("W", "W"),
        FieldSpec::text("A", "A"),
        FieldSpec::text("Ld", "Ld"),
        FieldSpec::text("Sv", "Sv"),
        FieldSpec::text("cost", "Cost"),
        FieldSpec::text("cost_description", "Cost Description"),
        FieldSpec::text("models_per_unit", "Models per unit"),
        FieldSpec::text("cost_including_wargear", "Cost including wargear"),
    ],
    inherit: None,
    gather: None,
    auxiliary: Some(AuxiliaryKind::DatasheetDamage),
};

static DATASHEET: EntityTypeSpec = EntityTypeSpec {
    entity_type: EntityType::Datasheet,
    label: "Datasheet",
    natural_key: true,
    renames: &[],
    external: &[],
    unique: NATURAL,
    fields: &[
        FieldSpec::text("link", "Link"),
        FieldSpec::reference("faction_id", "Faction ID", EntityType::Faction),
        FieldSpec::reference("source_id", "Source ID", EntityType::Source),
        FieldSpec::references("models", "Models", EntityType::Model),
    ],
    inherit: None,
    gather: Some(Gather {
        child: EntityType::Model,
        external: "datasheet_id",
        field: "models",
    }),
    auxiliary: None,
};
