//! Column mapping from CSV headers to internal field names

use serde::{Deserialize, Serialize};

/// Maps CSV header names to field names, plus an allow-list of columns
/// that are kept aside as external values instead of becoming fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// `(csv column, field name)` pairs in declaration order
    pub columns: Vec<(String, String)>,
    /// Columns retained under the record's external values
    pub external: Vec<String>,
}

impl ColumnMapping {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column rename
    pub fn map(mut self, column: impl Into<String>, field: impl Into<String>) -> Self {
        self.columns.push((column.into(), field.into()));
        self
    }

    /// Add a column to the external allow-list
    pub fn external(mut self, column: impl Into<String>) -> Self {
        self.external.push(column.into());
        self
    }

    /// Field name a header maps to, if it is mapped
    pub fn target(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, f)| f.as_str())
    }

    /// Whether a header belongs to the external allow-list
    pub fn is_external(&self, column: &str) -> bool {
        self.external.iter().any(|c| c == column)
    }

    /// Whether any field is mapped onto `field`
    pub fn maps_to(&self, field: &str) -> bool {
        self.columns.iter().any(|(_, f)| f == field)
    }
}
