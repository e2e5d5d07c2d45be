//! Tree builder: compiles a parsed query into an executable stage tree.
//!
//! The shape depends on whether the caller wants aggregate text scores:
//!
//! ```text
//! no positive terms        → EOF
//!
//! unscored:                  TEXT_MATCH
//!                              FETCH
//!                                [TEXT_NIN]           when negated terms
//!                                  OR
//!                                    TEXT_AND(scans)  per multi-term phrase
//!                                    scan             per single-term phrase
//!                                    scan             per solo term
//!
//! scored:                    TEXT_MATCH
//!                              TEXT_OR(scan per positive term)
//! ```
//!
//! In the scored shape the fetch is absorbed into TEXT_OR's output path and
//! phrase adjacency is left entirely to TEXT_MATCH; the union is enough
//! for ranking-level recall. Construction errors (version mismatch, empty
//! child lists) are fatal before any data flows.

use crate::cursor::{DocumentStore, ScanBounds, TermIndex};
use crate::eof::EofStage;
use crate::error::BuildError;
use crate::fetch::FetchStage;
use crate::or_stage::OrStage;
use crate::scan::IndexScanStage;
use crate::stage::PlanStage;
use crate::text_and::TextAndStage;
use crate::text_match::TextMatchStage;
use crate::text_nin::TextNinStage;
use crate::text_or::TextOrStage;
use folio_core::index_key::KeyField;
use folio_core::{ParsedTextQuery, TextIndexFormat};
use std::sync::Arc;

// ============================================================================
// ExecContext
// ============================================================================

/// Everything the builder needs besides the query itself: the target index,
/// the document store, the key layout, and the scoring mode.
#[derive(Clone)]
pub struct ExecContext {
    /// Whether the caller wants aggregate text scores.
    pub want_score: bool,
    /// Key layout of the target index.
    pub format: TextIndexFormat,
    /// Extra prefix field values baked into every scan bound; length must
    /// match `format.num_extra_before`.
    pub extra_prefix: Vec<KeyField>,
    /// Index storage.
    pub index: Arc<dyn TermIndex>,
    /// Document storage.
    pub store: Arc<dyn DocumentStore>,
}

impl ExecContext {
    /// Context for a scoring query with the default key layout.
    pub fn scoring(index: Arc<dyn TermIndex>, store: Arc<dyn DocumentStore>) -> Self {
        ExecContext {
            want_score: true,
            format: TextIndexFormat::default(),
            extra_prefix: Vec::new(),
            index,
            store,
        }
    }

    /// Context for an unscored query with the default key layout.
    pub fn unscored(index: Arc<dyn TermIndex>, store: Arc<dyn DocumentStore>) -> Self {
        ExecContext {
            want_score: false,
            ..Self::scoring(index, store)
        }
    }

    /// Override the key layout.
    pub fn with_format(mut self, format: TextIndexFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the extra prefix field values.
    pub fn with_extra_prefix(mut self, prefix: Vec<KeyField>) -> Self {
        self.extra_prefix = prefix;
        self
    }
}

// ============================================================================
// TreeBuilder
// ============================================================================

/// Compiles [`ParsedTextQuery`] values into stage trees.
pub struct TreeBuilder {
    ctx: ExecContext,
}

impl TreeBuilder {
    /// Builder over one execution context.
    pub fn new(ctx: ExecContext) -> Self {
        TreeBuilder { ctx }
    }

    fn scan(&self, term: &str) -> Box<dyn PlanStage> {
        Box::new(IndexScanStage::new(
            self.ctx.index.clone(),
            ScanBounds::for_term(&self.ctx.extra_prefix, term),
            self.ctx.format,
        ))
    }

    /// Build the stage tree for `query`.
    pub fn build(&self, query: &ParsedTextQuery) -> Result<Box<dyn PlanStage>, BuildError> {
        if query.index_format_version() != self.ctx.format.version {
            return Err(BuildError::IndexVersionMismatch {
                query: query.index_format_version().to_string(),
                index: self.ctx.format.version.to_string(),
            });
        }

        // No positive terms, no bounds to scan: the query matches nothing.
        if query.terms_for_bounds().is_empty() {
            return Ok(Box::new(EofStage));
        }

        let root = if self.ctx.want_score {
            self.build_scored(query)
        } else {
            self.build_unscored(query)?
        };
        tracing::debug!(
            target: "folio::text",
            want_score = self.ctx.want_score,
            terms = query.positive_terms().len(),
            phrases = query.positive_phrases().len(),
            negated = query.negated_terms().len(),
            "built text execution tree"
        );
        Ok(root)
    }

    /// Scored shape: union every positive term, let the predicate stage
    /// sort out phrases and negation against the fetched bodies.
    fn build_scored(&self, query: &ParsedTextQuery) -> Box<dyn PlanStage> {
        let scans = query
            .positive_terms()
            .iter()
            .map(|term| self.scan(term))
            .collect();
        let union = Box::new(TextOrStage::new(
            true,
            self.ctx.format,
            scans,
            Some(self.ctx.store.clone()),
        ));
        Box::new(TextMatchStage::new(union, query.clone()))
    }

    /// Unscored shape: phrase-structured union, anti-join for negated
    /// terms, explicit fetch, then the predicate.
    fn build_unscored(
        &self,
        query: &ParsedTextQuery,
    ) -> Result<Box<dyn PlanStage>, BuildError> {
        let mut branches: Vec<Box<dyn PlanStage>> = Vec::new();

        for phrase in query.positive_phrases() {
            if phrase.len() == 1 {
                // A one-term phrase needs no intersection.
                let term = phrase.iter().next().expect("phrase is non-empty");
                branches.push(self.scan(term));
            } else {
                let scans = phrase.iter().map(|term| self.scan(term)).collect();
                branches.push(Box::new(TextAndStage::new(
                    false,
                    self.ctx.format,
                    scans,
                )));
            }
        }
        for term in query.solo_terms() {
            branches.push(self.scan(term));
        }
        if branches.is_empty() {
            return Err(BuildError::NoChildren {
                stage: OrStage::NAME.to_string(),
            });
        }

        let mut inner: Box<dyn PlanStage> = Box::new(OrStage::new(branches));

        if !query.negated_terms().is_empty() {
            let feeders = query
                .negated_terms()
                .iter()
                .map(|term| self.scan(term))
                .collect();
            inner = Box::new(TextNinStage::new(inner, feeders));
        }

        let fetch = Box::new(FetchStage::new(inner, self.ctx.store.clone()));
        Ok(Box::new(TextMatchStage::new(fetch, query.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTextIndex;
    use folio_core::{TextIndexVersion, TextQueryBuilder};

    fn context(want_score: bool) -> ExecContext {
        let mut index = MemoryTextIndex::new(TextIndexFormat::default());
        index.insert(folio_core::RecordId(1), "alpha beta", &[("alpha", 1.0)]);
        index.seal();
        let index = Arc::new(index);
        if want_score {
            ExecContext::scoring(index.clone(), index)
        } else {
            ExecContext::unscored(index.clone(), index)
        }
    }

    #[test]
    fn test_empty_query_builds_eof() {
        let builder = TreeBuilder::new(context(true));
        let query = TextQueryBuilder::new().build().unwrap();
        let root = builder.build(&query).unwrap();
        assert_eq!(root.name(), EofStage::NAME);
    }

    #[test]
    fn test_scored_shape() {
        let builder = TreeBuilder::new(context(true));
        let query = TextQueryBuilder::new()
            .term("alpha")
            .term("beta")
            .build()
            .unwrap();
        let root = builder.build(&query).unwrap();

        assert_eq!(root.name(), TextMatchStage::NAME);
        let stats = root.stats();
        assert_eq!(stats.children[0].stage, TextOrStage::NAME);
        assert_eq!(stats.children[0].children.len(), 2);
        assert!(stats.children[0]
            .children
            .iter()
            .all(|c| c.stage == IndexScanStage::NAME));
    }

    #[test]
    fn test_unscored_shape_with_phrases_and_negation() {
        let builder = TreeBuilder::new(context(false));
        let query = TextQueryBuilder::new()
            .phrase(["big", "bang"])
            .phrase(["solo"])
            .term("extra")
            .negated_term("bad")
            .build()
            .unwrap();
        let root = builder.build(&query).unwrap();

        // TEXT_MATCH → FETCH → TEXT_NIN → OR
        assert_eq!(root.name(), TextMatchStage::NAME);
        let stats = root.stats();
        let fetch = &stats.children[0];
        assert_eq!(fetch.stage, FetchStage::NAME);
        let nin = &fetch.children[0];
        assert_eq!(nin.stage, TextNinStage::NAME);
        // One feeder scan plus the OR subtree.
        assert_eq!(nin.children.len(), 2);
        assert_eq!(nin.children[0].stage, IndexScanStage::NAME);
        let or = &nin.children[1];
        assert_eq!(or.stage, OrStage::NAME);
        // TEXT_AND for the two-term phrase, scans for the one-term phrase
        // and the solo term.
        let kinds: Vec<&str> = or.children.iter().map(|c| c.stage.as_str()).collect();
        assert!(kinds.contains(&TextAndStage::NAME));
        assert_eq!(
            kinds.iter().filter(|k| **k == IndexScanStage::NAME).count(),
            2
        );
    }

    #[test]
    fn test_version_mismatch_is_fatal() {
        let builder = TreeBuilder::new(context(true));
        let query = TextQueryBuilder::new()
            .term("alpha")
            .index_version(TextIndexVersion::V1)
            .build()
            .unwrap();
        let err = builder.build(&query).unwrap_err();
        assert!(matches!(err, BuildError::IndexVersionMismatch { .. }));
    }
}
