//! Parsed text query value object
//!
//! [`ParsedTextQuery`] is the parser's output and the tree-builder's input:
//! positive and negated terms, positive and negated phrases, plus the
//! folding flags and index version the execution core threads through.
//! It is immutable after construction; [`TextQueryBuilder`] enforces the
//! invariants:
//!
//! - a term never appears in both the positive and the negated set,
//! - phrase term-sets are non-empty,
//! - every phrase term is also a positive term (so `solo_terms`, the
//!   positive terms belonging to no phrase, is derivable and always a
//!   subset),
//! - the bounds-term set equals the positive-term set.
//!
//! Tokenization and stop-word filtering happen upstream in the parser; the
//! core treats terms as opaque byte keys, folded to lowercase at
//! construction unless case-sensitive mode is on.

use crate::error::{Error, Result};
use crate::index_key::TextIndexVersion;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// ParsedTextQuery
// ============================================================================

/// Immutable parsed text query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTextQuery {
    positive_terms: BTreeSet<String>,
    negated_terms: BTreeSet<String>,
    positive_phrases: Vec<BTreeSet<String>>,
    negated_phrases: Vec<BTreeSet<String>>,
    solo_terms: BTreeSet<String>,
    case_sensitive: bool,
    diacritic_sensitive: bool,
    index_format_version: TextIndexVersion,
}

impl ParsedTextQuery {
    /// All positive terms, phrase members included.
    pub fn positive_terms(&self) -> &BTreeSet<String> {
        &self.positive_terms
    }

    /// Terms whose presence anywhere in a document disqualifies it.
    pub fn negated_terms(&self) -> &BTreeSet<String> {
        &self.negated_terms
    }

    /// Positive phrases, each as the set of its component terms.
    pub fn positive_phrases(&self) -> &[BTreeSet<String>] {
        &self.positive_phrases
    }

    /// Negated phrases.
    pub fn negated_phrases(&self) -> &[BTreeSet<String>] {
        &self.negated_phrases
    }

    /// The terms index scans are materialized for. Equals the positive-term
    /// set; an empty result means the tree degenerates to an EOF stage
    /// before any scan is built.
    pub fn terms_for_bounds(&self) -> &BTreeSet<String> {
        &self.positive_terms
    }

    /// Positive terms that belong to no positive phrase.
    pub fn solo_terms(&self) -> &BTreeSet<String> {
        &self.solo_terms
    }

    /// Whether term comparison preserves case.
    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Whether term comparison preserves diacritics.
    pub fn diacritic_sensitive(&self) -> bool {
        self.diacritic_sensitive
    }

    /// Index key layout version this query was parsed against.
    pub fn index_format_version(&self) -> TextIndexVersion {
        self.index_format_version
    }
}

// ============================================================================
// TextQueryBuilder
// ============================================================================

/// Builder for [`ParsedTextQuery`]. Consumed by the query parser; also the
/// construction surface tests use directly.
#[derive(Debug, Clone, Default)]
pub struct TextQueryBuilder {
    positive_terms: Vec<String>,
    negated_terms: Vec<String>,
    positive_phrases: Vec<Vec<String>>,
    negated_phrases: Vec<Vec<String>>,
    case_sensitive: bool,
    diacritic_sensitive: bool,
    index_format_version: TextIndexVersion,
}

impl TextQueryBuilder {
    /// Start an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a positive term.
    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.positive_terms.push(term.into());
        self
    }

    /// Add several positive terms.
    pub fn terms(mut self, terms: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.positive_terms.extend(terms.into_iter().map(Into::into));
        self
    }

    /// Add a negated term.
    pub fn negated_term(mut self, term: impl Into<String>) -> Self {
        self.negated_terms.push(term.into());
        self
    }

    /// Add a positive phrase. Its terms also count as positive terms.
    pub fn phrase(mut self, terms: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.positive_phrases
            .push(terms.into_iter().map(Into::into).collect());
        self
    }

    /// Add a negated phrase. Its terms do NOT become negated terms: only
    /// the adjacent full phrase disqualifies a document.
    pub fn negated_phrase(
        mut self,
        terms: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.negated_phrases
            .push(terms.into_iter().map(Into::into).collect());
        self
    }

    /// Preserve case when comparing terms.
    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    /// Preserve diacritics when comparing terms.
    pub fn diacritic_sensitive(mut self, yes: bool) -> Self {
        self.diacritic_sensitive = yes;
        self
    }

    /// Target index key layout version.
    pub fn index_version(mut self, version: TextIndexVersion) -> Self {
        self.index_format_version = version;
        self
    }

    fn fold(&self, term: &str) -> String {
        if self.case_sensitive {
            term.to_string()
        } else {
            term.to_lowercase()
        }
    }

    /// Validate the invariants and freeze the query.
    pub fn build(self) -> Result<ParsedTextQuery> {
        let mut positive: BTreeSet<String> =
            self.positive_terms.iter().map(|t| self.fold(t)).collect();
        let negated: BTreeSet<String> =
            self.negated_terms.iter().map(|t| self.fold(t)).collect();

        let mut positive_phrases = Vec::with_capacity(self.positive_phrases.len());
        for phrase in &self.positive_phrases {
            if phrase.is_empty() {
                return Err(Error::InvalidQuery {
                    reason: "positive phrase has no terms".to_string(),
                });
            }
            let folded: BTreeSet<String> = phrase.iter().map(|t| self.fold(t)).collect();
            positive.extend(folded.iter().cloned());
            positive_phrases.push(folded);
        }

        let mut negated_phrases = Vec::with_capacity(self.negated_phrases.len());
        for phrase in &self.negated_phrases {
            if phrase.is_empty() {
                return Err(Error::InvalidQuery {
                    reason: "negated phrase has no terms".to_string(),
                });
            }
            negated_phrases.push(phrase.iter().map(|t| self.fold(t)).collect());
        }

        if let Some(clash) = positive.intersection(&negated).next() {
            return Err(Error::InvalidQuery {
                reason: format!("term appears both positive and negated: {clash:?}"),
            });
        }

        let in_phrases: BTreeSet<&String> = positive_phrases.iter().flatten().collect();
        let solo_terms = positive
            .iter()
            .filter(|t| !in_phrases.contains(t))
            .cloned()
            .collect();

        Ok(ParsedTextQuery {
            positive_terms: positive,
            negated_terms: negated,
            positive_phrases,
            negated_phrases,
            solo_terms,
            case_sensitive: self.case_sensitive,
            diacritic_sensitive: self.diacritic_sensitive,
            index_format_version: self.index_format_version,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_terms() {
        let q = TextQueryBuilder::new()
            .term("Alpha")
            .term("beta")
            .negated_term("Gamma")
            .build()
            .unwrap();

        // Folded to lowercase by default.
        assert!(q.positive_terms().contains("alpha"));
        assert!(q.positive_terms().contains("beta"));
        assert!(q.negated_terms().contains("gamma"));
        assert_eq!(q.terms_for_bounds(), q.positive_terms());
    }

    #[test]
    fn test_case_sensitive_mode_keeps_case() {
        let q = TextQueryBuilder::new()
            .case_sensitive(true)
            .term("Alpha")
            .build()
            .unwrap();
        assert!(q.positive_terms().contains("Alpha"));
        assert!(!q.positive_terms().contains("alpha"));
    }

    #[test]
    fn test_phrase_terms_join_positive_set() {
        let q = TextQueryBuilder::new()
            .term("solo")
            .phrase(["big", "bang"])
            .build()
            .unwrap();

        assert!(q.positive_terms().contains("big"));
        assert!(q.positive_terms().contains("bang"));
        assert!(q.positive_terms().contains("solo"));

        // solo_terms excludes phrase members.
        assert_eq!(q.solo_terms().len(), 1);
        assert!(q.solo_terms().contains("solo"));
        assert!(q.solo_terms().is_subset(q.positive_terms()));
    }

    #[test]
    fn test_negated_phrase_terms_stay_out_of_negated_set() {
        let q = TextQueryBuilder::new()
            .term("keep")
            .negated_phrase(["bad", "pair"])
            .build()
            .unwrap();
        assert!(q.negated_terms().is_empty());
        assert_eq!(q.negated_phrases().len(), 1);
    }

    #[test]
    fn test_conflicting_term_rejected() {
        let err = TextQueryBuilder::new()
            .term("x")
            .negated_term("x")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));

        // The clash is detected after folding.
        let err = TextQueryBuilder::new()
            .term("Mixed")
            .negated_term("mixed")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));
    }

    #[test]
    fn test_phrase_term_clashing_with_negated_rejected() {
        let err = TextQueryBuilder::new()
            .phrase(["a", "b"])
            .negated_term("a")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));
    }

    #[test]
    fn test_empty_phrase_rejected() {
        let err = TextQueryBuilder::new()
            .phrase(Vec::<String>::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));

        let err = TextQueryBuilder::new()
            .negated_phrase(Vec::<String>::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));
    }

    #[test]
    fn test_empty_query_is_fine() {
        // The builder accepts it; the tree-builder turns it into EOF.
        let q = TextQueryBuilder::new().build().unwrap();
        assert!(q.terms_for_bounds().is_empty());
    }

    #[test]
    fn test_serde_round_trip() {
        let q = TextQueryBuilder::new()
            .term("a")
            .phrase(["b", "c"])
            .negated_term("d")
            .index_version(TextIndexVersion::V1)
            .build()
            .unwrap();
        let json = serde_json::to_string(&q).unwrap();
        let back: ParsedTextQuery = serde_json::from_str(&json).unwrap();
        assert_eq!(q, back);
    }
}
