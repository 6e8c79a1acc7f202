//! Directory scanner for discovering Wahapedia CSV exports

use crate::error::Result;
use crate::schema::SourceKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Result of scanning directories
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanResult {
    /// Root directories that were scanned
    pub roots: Vec<PathBuf>,
    /// Recognized sources, keyed by source name
    pub sources: BTreeMap<String, PathBuf>,
    /// CSV files whose name matched no known source
    pub unrecognized: Vec<PathBuf>,
    /// Later matches for a source that was already found
    pub shadowed: Vec<PathBuf>,
    /// Total number of CSV files found
    pub total_files: usize,
}

impl ScanResult {
    /// Path found for a source, if any
    pub fn find(&self, key: SourceKey) -> Option<&Path> {
        self.sources.get(key.as_str()).map(PathBuf::as_path)
    }

    /// Known sources that were not found
    pub fn missing(&self) -> Vec<SourceKey> {
        SourceKey::all()
            .into_iter()
            .filter(|k| !self.sources.contains_key(k.as_str()))
            .collect()
    }
}

/// Scan one or more directories for the standard export file names
///
/// Directories are walked in file-name order and the first match of each
/// source wins.
pub fn scan_sources<P: AsRef<Path>>(roots: &[P]) -> Result<ScanResult> {
    let mut result = ScanResult {
        roots: roots.iter().map(|r| r.as_ref().to_path_buf()).collect(),
        ..ScanResult::default()
    };

    for root in roots {
        for entry in WalkDir::new(root.as_ref())
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file() || !path.extension().is_some_and(|ext| ext == "csv") {
                continue;
            }
            result.total_files += 1;

            let Some(key) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(source_for_file_name)
            else {
                result.unrecognized.push(path.to_path_buf());
                continue;
            };

            if result.sources.contains_key(key.as_str()) {
                result.shadowed.push(path.to_path_buf());
            } else {
                debug!(source = %key, path = %path.display(), "found source");
                result.sources.insert(key.as_str().to_string(), path.to_path_buf());
            }
        }
    }

    Ok(result)
}

/// Match a file name against the standard names, ignoring case
fn source_for_file_name(file_name: &str) -> Option<SourceKey> {
    SourceKey::all()
        .into_iter()
        .find(|k| k.default_file_name().eq_ignore_ascii_case(file_name))
}
