//! Interfaces to the storage collaborators.
//!
//! The execution core does not own index storage or document storage; it
//! pulls postings through [`TermCursor`] and materializes bodies through
//! [`DocumentStore`]. Both are borrowed for the duration of one query; the
//! snapshot behind them must stay live until the tree is dropped (enforced
//! by the storage layer, not here).

use crate::error::ExecResult;
use folio_core::index_key::{scan_bounds, KeyField};
use folio_core::{DocumentBody, IndexKeyBlob, RecordId, TextIndexFormat};

/// One `(record id, per-term score, index key)` triple pulled from a term's
/// posting stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    /// Document identity.
    pub record_id: RecordId,
    /// Per-term score stored in the index.
    pub score: f64,
    /// The raw index key, for downstream score re-extraction.
    pub key: IndexKeyBlob,
}

/// Start/end keys materializing one term's posting range.
///
/// The start key carries the maximum representable score and the end key
/// carries zero, so walking the range yields postings in strictly
/// descending score order.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanBounds {
    /// The term this range covers.
    pub term: String,
    /// Inclusive start key (highest score).
    pub start: IndexKeyBlob,
    /// Inclusive end key (score zero).
    pub end: IndexKeyBlob,
}

impl ScanBounds {
    /// Bounds for `term` under an index with the given extra prefix values.
    pub fn for_term(extra_prefix: &[KeyField], term: &str) -> Self {
        let (start, end) = scan_bounds(extra_prefix, term);
        ScanBounds {
            term: term.to_string(),
            start,
            end,
        }
    }
}

/// A term's posting stream.
///
/// Yields postings in strictly descending score order, is finite, and is
/// restartable only by reopening. `next` after exhaustion keeps returning
/// `Ok(None)`.
pub trait TermCursor {
    /// Pull the next posting.
    fn next(&mut self) -> ExecResult<Option<Posting>>;
}

/// Index storage: materializes term cursors from scan bounds.
pub trait TermIndex {
    /// Open a cursor over one term's postings. `Ok(None)` means the term
    /// has no postings at all (the scan is immediately EOF).
    fn open_term_cursor(
        &self,
        bounds: &ScanBounds,
        format: &TextIndexFormat,
    ) -> ExecResult<Option<Box<dyn TermCursor>>>;
}

/// Document storage: materializes a document body for a record id.
pub trait DocumentStore {
    /// Fetch the body. `None` means the record was invalidated (deleted
    /// after the posting was read); the caller flags the member and moves
    /// on.
    fn fetch(&self, id: RecordId) -> Option<DocumentBody>;
}
