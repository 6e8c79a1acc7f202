//! Cross-reference resolution between entity types
//!
//! Lookups are memoized for the lifetime of one import run. The cache is an
//! explicit value owned by the run, so two runs never share state.

use crate::entity::{EntityId, FieldValue};
use crate::identity::resolve_id;
use crate::record::RecordSet;
use crate::schema::EntityType;
use crate::store::{EntityStore, Properties};
use std::collections::HashMap;
use tracing::warn;

/// Memoized lookups for one import run
#[derive(Debug, Default)]
pub struct LinkCache {
    references: HashMap<(EntityType, String, String), EntityId>,
    parents: HashMap<(EntityType, String, String), Option<String>>,
    children: HashMap<(EntityType, String), HashMap<String, Vec<String>>>,
    store_queries: usize,
}

impl LinkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store queries issued so far
    pub fn store_queries(&self) -> usize {
        self.store_queries
    }

    /// Resolve `value` of `field` on `target` entities to an internal ID
    ///
    /// Only hits are cached: a miss is retried on the next call, since the
    /// target may be imported later in the run.
    pub fn resolve_reference<S: EntityStore + ?Sized>(
        &mut self,
        store: &S,
        target: EntityType,
        field: &str,
        value: &str,
    ) -> Option<EntityId> {
        let key = (target, field.to_string(), value.to_string());
        if let Some(id) = self.references.get(&key) {
            return Some(*id);
        }

        let mut properties = Properties::new();
        properties.insert(field.to_string(), FieldValue::text(value));
        self.store_queries += 1;

        let found = match store.load_by_properties(target, &properties) {
            Ok(found) => found,
            Err(e) => {
                warn!(%target, field, value, error = %e, "reference lookup failed");
                return None;
            }
        };

        let id = found.first().and_then(|e| e.id)?;
        self.references.insert(key, id);
        Some(id)
    }

    /// Read `field` from the parent record whose wid is `parent_wid`, scanning
    /// the parent type's parsed records rather than the store
    pub fn inherited_value(
        &mut self,
        parent_type: EntityType,
        parents: Option<&RecordSet>,
        parent_wid: &str,
        field: &str,
    ) -> Option<String> {
        let key = (parent_type, field.to_string(), parent_wid.to_string());
        if let Some(value) = self.parents.get(&key) {
            return value.clone();
        }

        let value = parents
            .and_then(|set| set.find_by("wid", parent_wid))
            .and_then(|parent| parent.get_non_empty(field))
            .map(str::to_string);
        self.parents.insert(key, value.clone());
        value
    }

    /// Derived wids of the child records whose `external` key equals
    /// `parent_wid`, in child source order
    pub fn child_wids(
        &mut self,
        child_type: EntityType,
        children: &RecordSet,
        external: &str,
        parent_wid: &str,
    ) -> Vec<String> {
        let index = self
            .children
            .entry((child_type, external.to_string()))
            .or_insert_with(|| {
                let spec = child_type.spec();
                let mut index: HashMap<String, Vec<String>> = HashMap::new();
                for child in &children.records {
                    let (Some(parent), Some(wid)) =
                        (child.get_external(external), resolve_id(spec, child))
                    else {
                        continue;
                    };
                    index.entry(parent.to_string()).or_default().push(wid);
                }
                index
            });

        index.get(parent_wid).cloned().unwrap_or_default()
    }
}
