//! JSON import configuration

use crate::error::{Error, Result};
use crate::orchestrator::{ImportOptions, DEFAULT_CHUNK_SIZE, DEFAULT_TEXT_FORMAT};
use crate::parser::{ParseOptions, DEFAULT_DELIMITER};
use crate::sanitize::Sanitizer;
use crate::scanner::ScanResult;
use crate::schema::{EntityType, SourceKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Import configuration file
///
/// Relative source paths are resolved against the directory of the file the
/// configuration was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// CSV path per source name (`faction`, `datasheet_damage`, ...)
    pub sources: BTreeMap<String, PathBuf>,
    /// Per entity type switch; missing types are enabled
    pub enabled: BTreeMap<String, bool>,
    pub update_existing: bool,
    pub chunk_size: usize,
    pub text_format: String,
    pub delimiter: char,
    pub encode_low: bool,
    pub strip_high: bool,
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        let sanitizer = Sanitizer::default();
        Self {
            sources: BTreeMap::new(),
            enabled: BTreeMap::new(),
            update_existing: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            text_format: DEFAULT_TEXT_FORMAT.to_string(),
            delimiter: DEFAULT_DELIMITER as char,
            encode_low: sanitizer.encode_low,
            strip_high: sanitizer.strip_high,
            base_dir: None,
        }
    }
}

impl ImportConfig {
    /// Load a configuration from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut config: Self = serde_json::from_str(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Save the configuration as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Configuration pointing at the standard file names inside `dir`
    pub fn template<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            sources: SourceKey::all()
                .into_iter()
                .map(|k| (k.as_str().to_string(), dir.join(k.default_file_name())))
                .collect(),
            enabled: EntityType::ALL
                .into_iter()
                .map(|t| (t.as_str().to_string(), true))
                .collect(),
            ..Self::default()
        }
    }

    /// Configuration with every source a scan found
    pub fn from_scan(scan: &ScanResult) -> Self {
        Self {
            sources: scan.sources.clone(),
            ..Self::default()
        }
    }

    pub fn is_enabled(&self, entity_type: EntityType) -> bool {
        self.enabled
            .get(entity_type.as_str())
            .copied()
            .unwrap_or(true)
    }

    /// Source paths with relative entries resolved
    pub fn resolved_sources(&self) -> BTreeMap<String, PathBuf> {
        self.sources
            .iter()
            .map(|(name, path)| {
                let path = match &self.base_dir {
                    Some(base) if path.is_relative() => base.join(path),
                    _ => path.clone(),
                };
                (name.clone(), path)
            })
            .collect()
    }

    /// Validate and convert into run options
    pub fn to_options(&self) -> Result<ImportOptions> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be at least 1".into()));
        }
        if self.text_format.trim().is_empty() {
            return Err(Error::InvalidConfig("text_format must not be empty".into()));
        }
        if !self.delimiter.is_ascii() {
            return Err(Error::InvalidConfig(format!(
                "delimiter '{}' is not a single-byte character",
                self.delimiter
            )));
        }
        for name in self.enabled.keys() {
            name.parse::<EntityType>()?;
        }

        Ok(ImportOptions {
            update_existing: self.update_existing,
            chunk_size: self.chunk_size,
            text_format: self.text_format.clone(),
            parse: ParseOptions {
                delimiter: self.delimiter as u8,
                sanitizer: Sanitizer {
                    encode_low: self.encode_low,
                    strip_high: self.strip_high,
                },
            },
            order: EntityType::ALL.to_vec(),
            disabled: EntityType::ALL
                .into_iter()
                .filter(|t| !self.is_enabled(*t))
                .collect(),
        })
    }
}
