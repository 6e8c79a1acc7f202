//! Cell and header cleanup applied while decoding CSV sources
//!
//! Upstream exports are UTF-8 with the occasional byte-order mark or
//! zero-width character glued to the first header. Those bytes make a
//! header like `id` compare unequal to the mapping key `id`, so every cell
//! goes through [`Sanitizer::clean`] before it is used.

use serde::{Deserialize, Serialize};

/// Characters that are invisible but not whitespace, always removed
const INVISIBLE: &[char] = &[
    '\u{feff}', // byte-order mark / zero-width no-break space
    '\u{200b}', // zero-width space
    '\u{200c}', // zero-width non-joiner
    '\u{200d}', // zero-width joiner
    '\u{2060}', // word joiner
    '\u{fffd}', // replacement character from lossy decoding
];

/// Cleanup flags for decoded cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sanitizer {
    /// Replace ASCII control characters with `&#NN;` entities
    pub encode_low: bool,
    /// Drop every character outside the ASCII range
    pub strip_high: bool,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            encode_low: true,
            strip_high: true,
        }
    }
}

impl Sanitizer {
    /// A sanitizer that only removes invisible characters
    pub fn minimal() -> Self {
        Self {
            encode_low: false,
            strip_high: false,
        }
    }

    /// Clean a single header or cell value
    pub fn clean(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        for c in value.chars() {
            if INVISIBLE.contains(&c) {
                continue;
            }
            if self.strip_high && !c.is_ascii() {
                continue;
            }
            if self.encode_low && (c as u32) < 0x20 {
                out.push_str(&format!("&#{};", c as u32));
                continue;
            }
            out.push(c);
        }
        out
    }
}
