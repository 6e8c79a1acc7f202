//! Entity store seam and an in-memory implementation

use crate::entity::{Entity, EntityId, FieldValue};
use crate::error::{Error, Result};
use crate::schema::EntityType;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Field/value pairs an entity must match
pub type Properties = BTreeMap<String, FieldValue>;

/// Errors reported by an entity store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store refused to persist an entity
    #[error("failed to save {entity_type} entity '{key}': {message}")]
    Save {
        entity_type: EntityType,
        key: String,
        message: String,
    },

    /// Deleting an entity failed
    #[error("failed to delete {entity_type} entity #{id}: {message}")]
    Delete {
        entity_type: EntityType,
        id: EntityId,
        message: String,
    },

    /// Query failure
    #[error("failed to query {entity_type} entities: {message}")]
    Query {
        entity_type: EntityType,
        message: String,
    },
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage collaborator used by the reconciliation engine
///
/// Entities are plain values: load a copy, mutate it, hand it back to
/// [`EntityStore::save`].
pub trait EntityStore {
    /// Entities of a type matching every property
    fn load_by_properties(
        &self,
        entity_type: EntityType,
        properties: &Properties,
    ) -> StoreResult<Vec<Entity>>;

    /// A new, unsaved entity of the type
    fn create(&self, entity_type: EntityType) -> Entity {
        Entity::new(entity_type)
    }

    /// Persist an entity, assigning its ID on first save
    fn save(&mut self, entity: &mut Entity) -> StoreResult<EntityId>;

    /// Remove a persisted entity
    fn delete(&mut self, entity: &Entity) -> StoreResult<()>;

    /// All entities of a type
    fn load_multiple(&self, entity_type: EntityType) -> StoreResult<Vec<Entity>>;
}

/// In-memory entity store with JSON persistence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    next_id: EntityId,
    entities: BTreeMap<EntityType, BTreeMap<EntityId, Entity>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a JSON file, or create empty if not exists
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save the store to a JSON file
    pub fn persist<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Number of stored entities of a type
    pub fn count(&self, entity_type: EntityType) -> usize {
        self.entities.get(&entity_type).map_or(0, BTreeMap::len)
    }

    /// Get a stored entity by ID
    pub fn get(&self, entity_type: EntityType, id: EntityId) -> Option<&Entity> {
        self.entities.get(&entity_type).and_then(|m| m.get(&id))
    }

    /// Find a stored entity by wid
    pub fn find_by_wid(&self, entity_type: EntityType, wid: &str) -> Option<&Entity> {
        self.entities
            .get(&entity_type)
            .and_then(|m| m.values().find(|e| e.wid() == Some(wid)))
    }
}

impl EntityStore for MemoryStore {
    fn load_by_properties(
        &self,
        entity_type: EntityType,
        properties: &Properties,
    ) -> StoreResult<Vec<Entity>> {
        Ok(self
            .entities
            .get(&entity_type)
            .map(|m| {
                m.values()
                    .filter(|e| e.matches(properties))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn save(&mut self, entity: &mut Entity) -> StoreResult<EntityId> {
        let now = Utc::now();
        let id = match entity.id {
            Some(id) => id,
            None => {
                self.next_id += 1;
                entity.id = Some(self.next_id);
                entity.created = Some(now);
                self.next_id
            }
        };
        entity.changed = Some(now);

        self.entities
            .entry(entity.entity_type)
            .or_default()
            .insert(id, entity.clone());
        Ok(id)
    }

    fn delete(&mut self, entity: &Entity) -> StoreResult<()> {
        if let Some(id) = entity.id {
            if let Some(m) = self.entities.get_mut(&entity.entity_type) {
                m.remove(&id);
            }
        }
        Ok(())
    }

    fn load_multiple(&self, entity_type: EntityType) -> StoreResult<Vec<Entity>> {
        Ok(self
            .entities
            .get(&entity_type)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }
}
