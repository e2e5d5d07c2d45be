//! Text index key layout
//!
//! A text-index key is a flat sequence of fields:
//!
//! ```text
//! [extra_prefix_fields…][term][score_as_double][suffix…]
//! ```
//!
//! realized as a length-delimited tagged encoding: each field starts with a
//! one-byte tag (`0x01` = utf8 string with u16 LE length prefix, `0x02` =
//! f64 LE). The scoring stages re-extract the per-term score from the key a
//! scan attached to a member, by skipping `num_extra_before + 1` leading
//! fields and reading the f64 that follows. The layout is fixed by the
//! index format version; this module is the single owner of that contract.
//!
//! Index scans walk the key range from `score = MAX_TERM_SCORE` down to
//! `score = 0`, which is what yields postings in descending-score order.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on any per-term score the index can store; used as the start
/// bound of a descending index scan.
pub const MAX_TERM_SCORE: f64 = 1.0e9;

const TAG_TEXT: u8 = 0x01;
const TAG_NUMBER: u8 = 0x02;

// ============================================================================
// TextIndexVersion / TextIndexFormat
// ============================================================================

/// Version of the on-disk text index key layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TextIndexVersion {
    /// Legacy layout.
    V1,
    /// Current layout.
    #[default]
    V2,
}

impl TextIndexVersion {
    /// Parse the raw version number stored in the index descriptor.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(TextIndexVersion::V1),
            2 => Some(TextIndexVersion::V2),
            _ => None,
        }
    }

    /// The raw version number for the index descriptor.
    pub fn as_raw(self) -> i32 {
        match self {
            TextIndexVersion::V1 => 1,
            TextIndexVersion::V2 => 2,
        }
    }
}

impl fmt::Display for TextIndexVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.as_raw())
    }
}

/// Key-layout parameters of one text index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TextIndexFormat {
    /// Layout version.
    pub version: TextIndexVersion,
    /// Number of non-text prefix fields preceding the term field.
    pub num_extra_before: usize,
}

impl TextIndexFormat {
    /// Format with `version` and no extra prefix fields.
    pub fn with_version(version: TextIndexVersion) -> Self {
        TextIndexFormat {
            version,
            num_extra_before: 0,
        }
    }
}

// ============================================================================
// KeyField / IndexKeyBlob
// ============================================================================

/// One field of an index key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeyField {
    /// A utf8 string field (terms, prefix equality values).
    Text(String),
    /// A numeric field (scores).
    Number(f64),
}

/// An encoded index key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKeyBlob(Vec<u8>);

impl IndexKeyBlob {
    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encoded length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for a zero-length blob.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============================================================================
// Encoding
// ============================================================================

fn push_field(buf: &mut Vec<u8>, field: &KeyField) {
    match field {
        KeyField::Text(text) => {
            buf.push(TAG_TEXT);
            let bytes = text.as_bytes();
            buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
            buf.extend_from_slice(bytes);
        }
        KeyField::Number(value) => {
            buf.push(TAG_NUMBER);
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Encode a text index key.
///
/// `extra_prefix` must carry exactly the index's `num_extra_before` fields;
/// `suffix` is whatever the index appends after the score (positions,
/// per-field markers) and is opaque to the execution core.
pub fn encode_key(
    extra_prefix: &[KeyField],
    term: &str,
    score: f64,
    suffix: &[KeyField],
) -> IndexKeyBlob {
    let mut buf = Vec::with_capacity(16 + term.len());
    for field in extra_prefix {
        push_field(&mut buf, field);
    }
    push_field(&mut buf, &KeyField::Text(term.to_string()));
    push_field(&mut buf, &KeyField::Number(score));
    for field in suffix {
        push_field(&mut buf, field);
    }
    IndexKeyBlob(buf)
}

/// The `(start, end)` key pair for a descending scan of one term's postings:
/// from [`MAX_TERM_SCORE`] down to zero, both ends inclusive.
pub fn scan_bounds(extra_prefix: &[KeyField], term: &str) -> (IndexKeyBlob, IndexKeyBlob) {
    (
        encode_key(extra_prefix, term, MAX_TERM_SCORE, &[]),
        encode_key(extra_prefix, term, 0.0, &[]),
    )
}

// ============================================================================
// Decoding
// ============================================================================

struct FieldCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FieldCursor<'a> {
    fn new(blob: &'a IndexKeyBlob) -> Self {
        FieldCursor {
            bytes: blob.as_bytes(),
            pos: 0,
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(Error::MalformedIndexKey {
                reason: format!("truncated field at offset {}", self.pos),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Skip one field, whatever its type.
    fn skip_field(&mut self) -> Result<()> {
        let tag = self.take(1)?[0];
        match tag {
            TAG_TEXT => {
                let len_bytes = self.take(2)?;
                let len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
                self.take(len)?;
                Ok(())
            }
            TAG_NUMBER => {
                self.take(8)?;
                Ok(())
            }
            other => Err(Error::MalformedIndexKey {
                reason: format!("unknown field tag 0x{other:02x}"),
            }),
        }
    }

    /// Read one field, requiring it to be a number.
    fn read_number(&mut self) -> Result<f64> {
        let tag = self.take(1)?[0];
        if tag != TAG_NUMBER {
            return Err(Error::MalformedIndexKey {
                reason: format!("expected number field, found tag 0x{tag:02x}"),
            });
        }
        let raw = self.take(8)?;
        let mut le = [0u8; 8];
        le.copy_from_slice(raw);
        Ok(f64::from_le_bytes(le))
    }
}

/// Extract the per-term score from a key: skip the extra prefix fields and
/// the term, then read the double that follows.
pub fn extract_score(blob: &IndexKeyBlob, format: &TextIndexFormat) -> Result<f64> {
    let mut cursor = FieldCursor::new(blob);
    for _ in 0..format.num_extra_before + 1 {
        cursor.skip_field()?;
    }
    cursor.read_number()
}

// ============================================================================
// Tests
// ============================================================================
