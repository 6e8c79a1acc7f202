//! Persisted entities and their field values

use crate::schema::{EntityType, EntityTypeSpec, LOCK_FIELD};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Internal surrogate ID assigned by the entity store
pub type EntityId = u64;

/// A typed field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    LongText { value: String, format: String },
    Boolean(bool),
    Date(NaiveDate),
    Reference(EntityId),
    References(Vec<EntityId>),
    /// Explicitly empty, e.g. an unresolved reference
    Null,
}

impl FieldValue {
    /// Build a text value
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    /// String form used when deriving identifiers and comparing keys
    pub fn key_string(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::LongText { value, .. } => value.clone(),
            FieldValue::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FieldValue::Reference(id) => id.to_string(),
            FieldValue::References(ids) => ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(","),
            FieldValue::Null => String::new(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Reference(id) => write!(f, "#{}", id),
            FieldValue::References(ids) => {
                let ids: Vec<String> = ids.iter().map(|id| format!("#{}", id)).collect();
                write!(f, "[{}]", ids.join(", "))
            }
            other => f.write_str(&other.key_string()),
        }
    }
}

/// An auxiliary sub-record saved together with its parent entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRecord {
    /// Kind of sub-record, e.g. `damage_row`
    pub kind: String,
    pub values: BTreeMap<String, String>,
}

impl ChildRecord {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

/// A persisted record of one entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Surrogate ID, `None` until first saved
    pub id: Option<EntityId>,
    pub entity_type: EntityType,
    pub fields: BTreeMap<String, FieldValue>,
    /// Sub-records keyed by the parent field holding them
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, Vec<ChildRecord>>,
    pub created: Option<DateTime<Utc>>,
    pub changed: Option<DateTime<Utc>>,
}

impl Entity {
    /// Create a new unsaved entity
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            id: None,
            entity_type,
            fields: BTreeMap::new(),
            children: BTreeMap::new(),
            created: None,
            changed: None,
        }
    }

    pub fn spec(&self) -> &'static EntityTypeSpec {
        self.entity_type.spec()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.spec().has_field(field)
    }

    /// Set a field; fields outside this type's schema are ignored
    ///
    /// Returns whether the value was stored.
    pub fn set(&mut self, field: &str, value: FieldValue) -> bool {
        if !self.has_field(field) {
            return false;
        }
        self.fields.insert(field.to_string(), value);
        true
    }

    /// Builder-style [`Entity::set`]
    pub fn with(mut self, field: &str, value: FieldValue) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Replace the sub-records held by `field`; an empty list removes them
    pub fn set_children(&mut self, field: &str, children: Vec<ChildRecord>) {
        if children.is_empty() {
            self.children.remove(field);
        } else {
            self.children.insert(field.to_string(), children);
        }
    }

    pub fn wid(&self) -> Option<&str> {
        match self.get("wid") {
            Some(FieldValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self.get("name") {
            Some(FieldValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Whether the entity rejects import-driven updates
    pub fn is_locked(&self) -> bool {
        matches!(self.get(LOCK_FIELD), Some(FieldValue::Boolean(true)))
    }

    /// Set or clear the import lock
    pub fn set_locked(&mut self, locked: bool) {
        self.set(LOCK_FIELD, FieldValue::Boolean(locked));
    }

    /// Whether every `(field, value)` pair matches this entity
    pub fn matches(&self, properties: &BTreeMap<String, FieldValue>) -> bool {
        properties.iter().all(|(field, value)| match self.get(field) {
            Some(current) => current == value,
            None => value.is_null(),
        })
    }
}
