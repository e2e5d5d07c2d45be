//! Final predicate re-check.
//!
//! The index can only prove that postings exist; adjacency of phrase terms
//! and the absence of negated terms are properties of the document text.
//! This stage re-validates every fetched document against the original
//! parsed query before it leaves the pipeline:
//!
//! - at least one positive term occurs in the body,
//! - every positive phrase occurs as an adjacent token run,
//! - no negated term occurs,
//! - no negated phrase occurs.
//!
//! Bodies are tokenized on UAX#29 word boundaries with the query's case
//! folding applied. Mismatching documents are freed and skipped.

use crate::error::ExecResult;
use crate::stage::{PlanStage, WorkState};
use crate::stats::{SpecificStats, StageStats};
use folio_core::{ParsedTextQuery, RecordId, WorkingSet};
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;
use unicode_segmentation::UnicodeSegmentation;

/// Predicate stage wrapping the top of the positive subtree.
pub struct TextMatchStage {
    child: Box<dyn PlanStage>,
    query: ParsedTextQuery,
    docs_rejected: u64,
}

impl TextMatchStage {
    /// Stage type name.
    pub const NAME: &'static str = "TEXT_MATCH";

    /// Re-check `child`'s output against `query`.
    pub fn new(child: Box<dyn PlanStage>, query: ParsedTextQuery) -> Self {
        TextMatchStage {
            child,
            query,
            docs_rejected: 0,
        }
    }

    fn tokenize(&self, body: &str) -> Vec<String> {
        body.unicode_words()
            .map(|word| {
                if self.query.case_sensitive() {
                    word.to_string()
                } else {
                    word.to_lowercase()
                }
            })
            .collect()
    }

    /// Whether the query predicate holds for a document body.
    pub fn matches(&self, body: &str) -> bool {
        let tokens = self.tokenize(body);
        let token_set: FxHashSet<&str> = tokens.iter().map(String::as_str).collect();

        if !self
            .query
            .positive_terms()
            .iter()
            .any(|term| token_set.contains(term.as_str()))
        {
            return false;
        }
        for phrase in self.query.positive_phrases() {
            if !contains_phrase(&tokens, phrase) {
                return false;
            }
        }
        if self
            .query
            .negated_terms()
            .iter()
            .any(|term| token_set.contains(term.as_str()))
        {
            return false;
        }
        for phrase in self.query.negated_phrases() {
            if contains_phrase(&tokens, phrase) {
                return false;
            }
        }
        true
    }
}

/// Adjacency check: some window of `phrase.len()` consecutive tokens covers
/// exactly the phrase's term set.
fn contains_phrase(tokens: &[String], phrase: &BTreeSet<String>) -> bool {
    let k = phrase.len();
    if k == 0 || tokens.len() < k {
        return false;
    }
    'windows: for window in tokens.windows(k) {
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        for token in window {
            if !phrase.contains(token.as_str()) {
                continue 'windows;
            }
            seen.insert(token.as_str());
        }
        if seen.len() == k {
            return true;
        }
    }
    false
}

impl PlanStage for TextMatchStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn work(&mut self, ws: &mut WorkingSet) -> ExecResult<WorkState> {
        match self.child.work(ws)? {
            WorkState::Advanced(id) => {
                if ws.is_flagged(id) {
                    return Ok(WorkState::NeedTime);
                }
                let Some(body) = ws.get(id).and_then(|m| m.body.clone()) else {
                    // The fetch path is required below this stage; a member
                    // without a body cannot be validated.
                    ws.flag_for_review(id);
                    return Ok(WorkState::NeedTime);
                };
                if self.matches(body.as_str()) {
                    Ok(WorkState::Advanced(id))
                } else {
                    self.docs_rejected += 1;
                    ws.free(id);
                    Ok(WorkState::NeedTime)
                }
            }
            other => Ok(other),
        }
    }

    fn is_eof(&self) -> bool {
        self.child.is_eof()
    }

    fn invalidate(&mut self, ws: &mut WorkingSet, id: RecordId) {
        self.child.invalidate(ws, id);
    }

    fn stats(&self) -> StageStats {
        StageStats {
            stage: Self::NAME.to_string(),
            specific: SpecificStats::TextMatch {
                docs_rejected: self.docs_rejected,
            },
            children: vec![self.child.stats()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eof::EofStage;
    use folio_core::TextQueryBuilder;

    fn matcher(query: ParsedTextQuery) -> TextMatchStage {
        TextMatchStage::new(Box::new(EofStage), query)
    }

    #[test]
    fn test_positive_term_required() {
        let stage = matcher(TextQueryBuilder::new().term("rust").build().unwrap());
        assert!(stage.matches("I write Rust all day"));
        assert!(!stage.matches("plain prose about nothing"));
    }

    #[test]
    fn test_case_folding_follows_query_mode() {
        let insensitive = matcher(TextQueryBuilder::new().term("Rust").build().unwrap());
        assert!(insensitive.matches("RUST everywhere"));

        let sensitive = matcher(
            TextQueryBuilder::new()
                .case_sensitive(true)
                .term("Rust")
                .build()
                .unwrap(),
        );
        assert!(sensitive.matches("Rust matters"));
        assert!(!sensitive.matches("rust matters"));
    }

    #[test]
    fn test_phrase_requires_adjacency() {
        let stage = matcher(
            TextQueryBuilder::new()
                .phrase(["big", "bang"])
                .build()
                .unwrap(),
        );
        assert!(stage.matches("the big bang theory"));
        assert!(stage.matches("a bang big enough")); // unordered window
        assert!(!stage.matches("big and slow bang")); // not adjacent
        assert!(!stage.matches("big big big")); // set not covered
    }

    #[test]
    fn test_negated_term_rejects() {
        let stage = matcher(
            TextQueryBuilder::new()
                .term("rust")
                .negated_term("segfault")
                .build()
                .unwrap(),
        );
        assert!(stage.matches("rust is memory safe"));
        assert!(!stage.matches("rust prevented the segfault"));
    }

    #[test]
    fn test_negated_phrase_rejects_only_adjacent_run() {
        let stage = matcher(
            TextQueryBuilder::new()
                .term("database")
                .negated_phrase(["data", "loss"])
                .build()
                .unwrap(),
        );
        assert!(!stage.matches("database data loss happened"));
        // Terms present but separated: the phrase does not occur.
        assert!(stage.matches("database kept data without loss"));
    }

    #[test]
    fn test_rejection_frees_member() {
        use crate::cursor::ScanBounds;
        use crate::fetch::FetchStage;
        use crate::memory::MemoryTextIndex;
        use crate::scan::IndexScanStage;
        use folio_core::{RecordId, TextIndexFormat};
        use std::sync::Arc;

        // Index claims "bang" for both docs; only one body really carries
        // the adjacent phrase.
        let mut index = MemoryTextIndex::new(TextIndexFormat::default());
        index.insert(RecordId(1), "big bang cosmology", &[("bang", 1.0)]);
        index.insert(RecordId(2), "a bang without the rest", &[("bang", 0.5)]);
        index.seal();
        let index = Arc::new(index);

        let scan = Box::new(IndexScanStage::new(
            index.clone(),
            ScanBounds::for_term(&[], "bang"),
            TextIndexFormat::default(),
        ));
        let fetch = Box::new(FetchStage::new(scan, index.clone()));
        let query = TextQueryBuilder::new().phrase(["big", "bang"]).build().unwrap();
        let mut stage = TextMatchStage::new(fetch, query);

        let mut ws = WorkingSet::new();
        let mut out = Vec::new();
        loop {
            match stage.work(&mut ws).unwrap() {
                WorkState::Advanced(id) => out.push(ws.get(id).unwrap().record_id.unwrap()),
                WorkState::NeedTime | WorkState::NeedYield(_) => continue,
                WorkState::Eof => break,
            }
        }

        assert_eq!(out, vec![RecordId(1)]);
        // The rejected member was released back to the arena.
        assert_eq!(ws.live(), 1);
        match stage.stats().specific {
            SpecificStats::TextMatch { docs_rejected } => assert_eq!(docs_rejected, 1),
            other => panic!("wrong stats {other:?}"),
        }
    }
}
