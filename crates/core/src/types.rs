//! Identity types shared across the execution pipeline
//!
//! - RecordId: stable document identity within the storage engine
//! - WorkingSetId: handle into the working-set arena
//! - DocumentBody: the fetched text of a document

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// RecordId
// ============================================================================

/// Stable identity of a document within the storage engine.
///
/// The text execution core treats record ids as opaque: it compares and
/// hashes them but never interprets the value. The storage engine may reuse
/// an id after the original document is deleted; the invalidation hooks on
/// the stages exist so that a reused id is treated as a fresh record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rid:{}", self.0)
    }
}

impl From<i64> for RecordId {
    fn from(raw: i64) -> Self {
        RecordId(raw)
    }
}

// ============================================================================
// WorkingSetId
// ============================================================================

/// Handle into the [`WorkingSet`](crate::WorkingSet) arena.
///
/// Stages pass these integer handles between each other instead of borrowing
/// members directly; the arena outlives every stage in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkingSetId(pub u32);

impl WorkingSetId {
    /// Sentinel for "no member".
    pub const INVALID: WorkingSetId = WorkingSetId(u32::MAX);

    /// True unless this is the [`INVALID`](Self::INVALID) sentinel.
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for WorkingSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "wsid:{}", self.0)
        } else {
            write!(f, "wsid:invalid")
        }
    }
}

// ============================================================================
// DocumentBody
// ============================================================================

/// The fetched text of a document, as materialized by the document store.
///
/// The text-match predicate runs over this; the rest of the pipeline never
/// looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentBody(pub String);

impl DocumentBody {
    /// Borrow the raw text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocumentBody {
    fn from(text: &str) -> Self {
        DocumentBody(text.to_string())
    }
}

impl From<String> for DocumentBody {
    fn from(text: String) -> Self {
        DocumentBody(text)
    }
}

// ============================================================================
// Tests
// ============================================================================
