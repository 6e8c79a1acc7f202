//! Parsed CSV records, before identity and linking

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// All records parsed from a single CSV source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSet {
    /// Field names kept after mapping, in header order
    pub columns: Vec<String>,
    /// Records in source row order
    pub records: Vec<RawRecord>,
    /// Source file path
    pub source_path: PathBuf,
}

impl RecordSet {
    /// Create a new empty record set
    pub fn new(source_path: PathBuf) -> Self {
        Self {
            columns: Vec::new(),
            records: Vec::new(),
            source_path,
        }
    }

    /// Get the number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the source had no data rows
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Find the first record whose `field` equals `value`
    pub fn find_by(&self, field: &str, value: &str) -> Option<&RawRecord> {
        self.records.iter().find(|r| r.get(field) == Some(value))
    }
}

/// One CSV row: sanitized values keyed by field name, plus external values
/// that influence identity and linking but never become entity fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Mapped field values
    pub fields: BTreeMap<String, String>,
    /// Values siphoned from the external allow-list
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub external: BTreeMap<String, String>,
}

impl RawRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insert
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Builder-style external insert
    pub fn with_external(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.external.insert(key.into(), value.into());
        self
    }

    /// Get a field value
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Get a field value, treating empty strings as missing
    pub fn get_non_empty(&self, field: &str) -> Option<&str> {
        self.get(field).filter(|v| !v.is_empty())
    }

    /// Get an external value
    pub fn get_external(&self, key: &str) -> Option<&str> {
        self.external.get(key).map(String::as_str)
    }

    /// Set a field value
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    /// The upstream natural key, if the row carried one
    pub fn wid(&self) -> Option<&str> {
        self.get_non_empty("wid")
    }
}
