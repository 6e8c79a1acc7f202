//! CSV parser for Wahapedia export files

use crate::error::{Error, Result};
use crate::mapping::ColumnMapping;
use crate::record::{RawRecord, RecordSet};
use crate::sanitize::Sanitizer;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default field separator of the upstream exports
pub const DEFAULT_DELIMITER: u8 = b'|';

/// Options controlling how a source is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Single-byte field separator
    pub delimiter: u8,
    /// Cleanup applied to every header and cell
    pub sanitizer: Sanitizer,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            sanitizer: Sanitizer::default(),
        }
    }
}

impl ParseOptions {
    /// Default options with a different separator
    pub fn with_delimiter(delimiter: u8) -> Self {
        Self {
            delimiter,
            ..Self::default()
        }
    }
}

/// Where a header column ends up in each record
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Field(String),
    External(String),
    Drop,
}

/// Parse a CSV file into a RecordSet
///
/// When a mapping is given, unmapped columns are dropped, mapped columns are
/// renamed and allow-listed columns go to each record's external values.
pub fn parse_csv<P: AsRef<Path>>(
    path: P,
    mapping: Option<&ColumnMapping>,
    options: &ParseOptions,
) -> Result<RecordSet> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_reader(BufReader::new(file), path.to_path_buf(), mapping, options)
}

/// Parse CSV from a string (useful for testing)
pub fn parse_csv_str(
    content: &str,
    source_name: &str,
    mapping: Option<&ColumnMapping>,
    options: &ParseOptions,
) -> Result<RecordSet> {
    parse_reader(
        content.as_bytes(),
        PathBuf::from(source_name),
        mapping,
        options,
    )
}

fn parse_reader<R: Read>(
    reader: R,
    path: PathBuf,
    mapping: Option<&ColumnMapping>,
    options: &ParseOptions,
) -> Result<RecordSet> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(options.delimiter)
        .flexible(true) // Allow varying number of fields
        .from_reader(reader);

    let headers = csv_reader.byte_headers().map_err(|e| Error::Csv {
        path: path.clone(),
        source: e,
    })?;

    let slots: Vec<Slot> = headers
        .iter()
        .map(|raw| {
            let name = options.sanitizer.clean(&String::from_utf8_lossy(raw));
            slot_for(&name, mapping)
        })
        .collect();

    if slots.is_empty() {
        return Err(Error::CsvParse {
            path,
            message: "no columns found in CSV".to_string(),
        });
    }

    let columns: Vec<String> = slots
        .iter()
        .filter_map(|s| match s {
            Slot::Field(name) => Some(name.clone()),
            _ => None,
        })
        .collect();

    let mut records = Vec::new();
    for (row_idx, result) in csv_reader.byte_records().enumerate() {
        let row = result.map_err(|e| Error::Csv {
            path: path.clone(),
            source: e,
        })?;

        if row.len() > slots.len() {
            warn!(
                row = row_idx + 1,
                path = %path.display(),
                "row has more cells than columns, truncating"
            );
        }

        let mut record = RawRecord::new();
        for (idx, slot) in slots.iter().enumerate() {
            // Short rows are padded with empty cells
            let value = row
                .get(idx)
                .map(|cell| options.sanitizer.clean(&String::from_utf8_lossy(cell)))
                .unwrap_or_default();

            match slot {
                Slot::Field(name) => {
                    record.fields.insert(name.clone(), value);
                }
                Slot::External(name) => {
                    record.external.insert(name.clone(), value);
                }
                Slot::Drop => {}
            }
        }
        records.push(record);
    }

    debug!(
        path = %path.display(),
        records = records.len(),
        columns = columns.len(),
        "parsed CSV source"
    );

    Ok(RecordSet {
        columns,
        records,
        source_path: path,
    })
}

fn slot_for(header: &str, mapping: Option<&ColumnMapping>) -> Slot {
    // Trailing separators produce nameless columns
    if header.is_empty() {
        return Slot::Drop;
    }

    match mapping {
        None => Slot::Field(header.to_string()),
        Some(mapping) => {
            if let Some(field) = mapping.target(header) {
                Slot::Field(field.to_string())
            } else if mapping.is_external(header) {
                Slot::External(header.to_string())
            } else {
                Slot::Drop
            }
        }
    }
}
