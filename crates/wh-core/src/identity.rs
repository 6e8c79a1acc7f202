//! Stable identifier derivation for records without a natural key

use crate::record::RawRecord;
use crate::schema::{EntityTypeSpec, KeyPart};
use sha2::{Digest, Sha256};

/// Prefix marking a derived identifier
pub const DERIVED_WID_TAG: &str = "SH-";

/// Hex digits of the digest kept in a derived identifier
pub const DERIVED_WID_DIGITS: usize = 12;

/// Separator between key parts in the hashed string
const PART_SEPARATOR: &str = "-";

/// Anything identity can be derived from
pub trait KeySource {
    /// The natural key, if the record carries a non-empty one
    fn natural_wid(&self) -> Option<&str>;

    /// String value of one key part; missing parts read as empty
    fn key_part(&self, part: &KeyPart) -> String;
}

impl KeySource for RawRecord {
    fn natural_wid(&self) -> Option<&str> {
        self.wid()
    }

    fn key_part(&self, part: &KeyPart) -> String {
        match part {
            KeyPart::Field(name) => self.get(name),
            KeyPart::External(name) => self.get_external(name),
        }
        .unwrap_or_default()
        .to_string()
    }
}

/// Derive the fixed-width identifier for a key string
///
/// Same input bytes always give the same token.
pub fn wid_from_string(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}{}", DERIVED_WID_TAG, &digest[..DERIVED_WID_DIGITS])
}

/// The key string hashed for a record, `None` when every part is empty
pub fn unique_key<R: KeySource>(spec: &EntityTypeSpec, record: &R) -> Option<String> {
    let parts: Vec<String> = spec
        .unique
        .iter()
        .filter(|p| **p != KeyPart::Field("wid"))
        .map(|p| record.key_part(p))
        .collect();

    if parts.iter().all(String::is_empty) {
        return None;
    }
    Some(parts.join(PART_SEPARATOR))
}

/// Resolve a record's identifier: its natural key unchanged, otherwise a
/// digest of the type's unique fields in declared order
pub fn resolve_id<R: KeySource>(spec: &EntityTypeSpec, record: &R) -> Option<String> {
    if let Some(wid) = record.natural_wid() {
        return Some(wid.to_string());
    }
    unique_key(spec, record).map(|key| wid_from_string(&key))
}
