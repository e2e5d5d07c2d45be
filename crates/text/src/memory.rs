//! In-memory term index and document store.
//!
//! The reference implementation of the storage interfaces: posting lists
//! per term, sorted by descending score when the index is sealed, plus a
//! body per record for the fetch path. Production deployments plug their
//! own storage in through the same traits; this one backs the test suite
//! and small embedded corpora.

use crate::cursor::{DocumentStore, Posting, ScanBounds, TermCursor, TermIndex};
use crate::error::ExecResult;
use folio_core::index_key::{encode_key, KeyField};
use folio_core::{DocumentBody, IndexKeyBlob, RecordId, TextIndexFormat};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// In-memory inverted index over per-term scored postings.
#[derive(Debug, Default)]
pub struct MemoryTextIndex {
    format: TextIndexFormat,
    extra_prefix: Vec<KeyField>,
    postings: BTreeMap<String, Vec<(RecordId, f64)>>,
    docs: FxHashMap<RecordId, String>,
    sealed: bool,
}

impl MemoryTextIndex {
    /// Empty index with the given key layout.
    pub fn new(format: TextIndexFormat) -> Self {
        MemoryTextIndex {
            format,
            extra_prefix: Vec::new(),
            postings: BTreeMap::new(),
            docs: FxHashMap::default(),
            sealed: false,
        }
    }

    /// Set the extra prefix field values encoded into every key. Must match
    /// the format's `num_extra_before`.
    pub fn with_extra_prefix(mut self, prefix: Vec<KeyField>) -> Self {
        self.extra_prefix = prefix;
        self
    }

    /// Add one posting. The index must not be sealed yet.
    pub fn insert_posting(&mut self, term: &str, id: RecordId, score: f64) {
        assert!(!self.sealed, "index already sealed");
        self.postings
            .entry(term.to_string())
            .or_default()
            .push((id, score));
    }

    /// Add a document body plus its per-term postings in one call.
    pub fn insert(&mut self, id: RecordId, body: &str, term_scores: &[(&str, f64)]) {
        self.docs.insert(id, body.to_string());
        for (term, score) in term_scores {
            self.insert_posting(term, id, *score);
        }
    }

    /// Sort every posting list into descending score order (ties by record
    /// id, for determinism) and freeze the index.
    pub fn seal(&mut self) {
        for list in self.postings.values_mut() {
            list.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        }
        self.sealed = true;
    }

    /// Number of distinct terms.
    pub fn term_count(&self) -> usize {
        self.postings.len()
    }
}

/// Cursor over one sealed posting list.
struct MemoryTermCursor {
    term: String,
    extra_prefix: Vec<KeyField>,
    postings: Vec<(RecordId, f64)>,
    pos: usize,
}

impl TermCursor for MemoryTermCursor {
    fn next(&mut self) -> ExecResult<Option<Posting>> {
        let Some(&(record_id, score)) = self.postings.get(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;
        let key: IndexKeyBlob = encode_key(&self.extra_prefix, &self.term, score, &[]);
        Ok(Some(Posting {
            record_id,
            score,
            key,
        }))
    }
}

impl TermIndex for MemoryTextIndex {
    fn open_term_cursor(
        &self,
        bounds: &ScanBounds,
        _format: &TextIndexFormat,
    ) -> ExecResult<Option<Box<dyn TermCursor>>> {
        debug_assert!(self.sealed, "query against unsealed index");
        let Some(list) = self.postings.get(&bounds.term) else {
            return Ok(None);
        };
        Ok(Some(Box::new(MemoryTermCursor {
            term: bounds.term.clone(),
            extra_prefix: self.extra_prefix.clone(),
            postings: list.clone(),
            pos: 0,
        })))
    }
}

impl DocumentStore for MemoryTextIndex {
    fn fetch(&self, id: RecordId) -> Option<DocumentBody> {
        self.docs.get(&id).map(|body| DocumentBody(body.clone()))
    }
}
