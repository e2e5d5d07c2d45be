//! Invariant checks over generated corpora, cross-validated against
//! brute-force evaluation of the same posting lists.

use folio_text::{
    IndexScanStage, MemoryTextIndex, OrStage, PlanExecutor, PlanStage, RecordId, ScanBounds,
    TextAndStage, TextIndexFormat, TextNinStage, TextOrStage,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Small deterministic generator so the fixtures are reproducible without
/// pulling in an RNG.
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Lcg(seed)
    }

    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    /// A score in (0, 4], quantized to 1/64 so float sums stay exact.
    fn score(&mut self) -> f64 {
        ((self.next() % 256) + 1) as f64 / 64.0
    }
}

/// Generated corpus: per-term posting maps, mirrored into a memory index.
struct Corpus {
    index: Arc<MemoryTextIndex>,
    postings: BTreeMap<String, BTreeMap<RecordId, f64>>,
}

fn build_corpus(seed: u64, terms: &[&str], docs: i64, density_pct: u64) -> Corpus {
    let mut lcg = Lcg::new(seed);
    let mut index = MemoryTextIndex::new(TextIndexFormat::default());
    let mut postings: BTreeMap<String, BTreeMap<RecordId, f64>> = BTreeMap::new();

    for term in terms {
        let mut list = BTreeMap::new();
        for doc in 0..docs {
            if lcg.next() % 100 < density_pct {
                let score = lcg.score();
                index.insert_posting(term, RecordId(doc), score);
                list.insert(RecordId(doc), score);
            }
        }
        postings.insert(term.to_string(), list);
    }
    index.seal();
    Corpus {
        index: Arc::new(index),
        postings,
    }
}

impl Corpus {
    fn scan(&self, term: &str) -> Box<dyn PlanStage> {
        Box::new(IndexScanStage::new(
            self.index.clone(),
            ScanBounds::for_term(&[], term),
            TextIndexFormat::default(),
        ))
    }

    fn scans(&self, terms: &[&str]) -> Vec<Box<dyn PlanStage>> {
        terms.iter().map(|t| self.scan(t)).collect()
    }

    fn ids_with(&self, term: &str) -> BTreeSet<RecordId> {
        self.postings[term].keys().copied().collect()
    }

    /// Brute-force aggregate score over every term's posting maps.
    fn expected_score(&self, terms: &[&str], id: RecordId) -> f64 {
        terms
            .iter()
            .filter_map(|t| self.postings[*t].get(&id))
            .sum()
    }
}

#[test]
fn text_or_emits_each_record_once() {
    let corpus = build_corpus(7, &["a", "b", "c"], 200, 40);
    let root = Box::new(TextOrStage::new(
        true,
        TextIndexFormat::default(),
        corpus.scans(&["a", "b", "c"]),
        None,
    ));
    let results = PlanExecutor::new(root).run().unwrap();

    let ids: Vec<RecordId> = results.hits.iter().map(|h| h.record_id).collect();
    let unique: BTreeSet<RecordId> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len(), "duplicate emission");

    // Union completeness as well: every posting's record surfaced.
    let expected: BTreeSet<RecordId> = ["a", "b", "c"]
        .iter()
        .flat_map(|t| corpus.ids_with(t))
        .collect();
    assert_eq!(unique, expected);
}

#[test]
fn text_or_scores_are_sums_and_non_increasing() {
    let corpus = build_corpus(11, &["a", "b", "c", "d"], 300, 30);
    let terms = ["a", "b", "c", "d"];
    let root = Box::new(TextOrStage::new(
        true,
        TextIndexFormat::default(),
        corpus.scans(&terms),
        None,
    ));
    let results = PlanExecutor::new(root).run().unwrap();

    let mut previous = f64::INFINITY;
    for hit in &results.hits {
        let score = hit.score.unwrap();
        assert!(
            score <= previous,
            "score increased: {score} after {previous}"
        );
        previous = score;

        let expected = corpus.expected_score(&terms, hit.record_id);
        assert_eq!(
            score, expected,
            "score of {} is not the per-term sum",
            hit.record_id
        );
    }
}

#[test]
fn text_and_matches_brute_force_intersection() {
    let corpus = build_corpus(13, &["x", "y", "z"], 250, 55);
    let terms = ["x", "y", "z"];
    let root = Box::new(TextAndStage::new(
        true,
        TextIndexFormat::default(),
        corpus.scans(&terms),
    ));
    let results = PlanExecutor::new(root).run().unwrap();

    let got: BTreeSet<RecordId> = results.hits.iter().map(|h| h.record_id).collect();
    let expected: BTreeSet<RecordId> = corpus
        .ids_with("x")
        .intersection(&corpus.ids_with("y"))
        .copied()
        .collect::<BTreeSet<_>>()
        .intersection(&corpus.ids_with("z"))
        .copied()
        .collect();
    assert_eq!(got, expected, "intersection mismatch");

    // Collected records carry the full sum.
    for hit in &results.hits {
        assert_eq!(
            hit.score.unwrap(),
            corpus.expected_score(&terms, hit.record_id)
        );
    }
}

#[test]
fn text_nin_matches_brute_force_difference() {
    let corpus = build_corpus(17, &["p", "q", "n1", "n2"], 200, 45);
    let inner = Box::new(OrStage::new(corpus.scans(&["p", "q"])));
    let root = Box::new(TextNinStage::new(
        inner,
        corpus.scans(&["n1", "n2"]),
    ));
    let results = PlanExecutor::new(root).run().unwrap();

    let got: BTreeSet<RecordId> = results.hits.iter().map(|h| h.record_id).collect();
    let mut expected: BTreeSet<RecordId> = corpus
        .ids_with("p")
        .union(&corpus.ids_with("q"))
        .copied()
        .collect();
    for negated in ["n1", "n2"] {
        for id in corpus.ids_with(negated) {
            expected.remove(&id);
        }
    }
    assert_eq!(got, expected, "anti-join mismatch");
}

#[test]
fn early_emission_never_breaks_ordering() {
    // Heavy overlap and long tails maximize early-emission opportunities;
    // the emitted sequence must still be perfectly sorted and complete.
    let corpus = build_corpus(23, &["a", "b", "c"], 500, 70);
    let terms = ["a", "b", "c"];
    let root = Box::new(TextOrStage::new(
        true,
        TextIndexFormat::default(),
        corpus.scans(&terms),
        None,
    ));
    let results = PlanExecutor::new(root).run().unwrap();

    let mut previous = f64::INFINITY;
    for hit in &results.hits {
        let score = hit.score.unwrap();
        assert!(score <= previous);
        previous = score;
        assert_eq!(score, corpus.expected_score(&terms, hit.record_id));
    }

    let expected: BTreeSet<RecordId> = terms
        .iter()
        .flat_map(|t| corpus.ids_with(t))
        .collect();
    let got: BTreeSet<RecordId> = results.hits.iter().map(|h| h.record_id).collect();
    assert_eq!(got, expected);
}

#[test]
fn invalidate_is_idempotent_and_ignores_unknown_ids() {
    let corpus = build_corpus(29, &["a", "b"], 100, 50);
    let build = || {
        Box::new(TextOrStage::new(
            true,
            TextIndexFormat::default(),
            corpus.scans(&["a", "b"]),
            None,
        ))
    };

    // Run one: invalidate an id once mid-stream.
    let mut exec_once = PlanExecutor::new(build());
    let first = exec_once.next().unwrap().unwrap();
    exec_once.invalidate(RecordId(42));
    let mut rest_once: Vec<RecordId> = Vec::new();
    while let Some(hit) = exec_once.next().unwrap() {
        rest_once.push(hit.record_id);
    }

    // Run two: same point, invalidate twice plus an unknown id.
    let mut exec_twice = PlanExecutor::new(build());
    let first_again = exec_twice.next().unwrap().unwrap();
    assert_eq!(first.record_id, first_again.record_id);
    exec_twice.invalidate(RecordId(42));
    exec_twice.invalidate(RecordId(42));
    exec_twice.invalidate(RecordId(999_999));
    let mut rest_twice: Vec<RecordId> = Vec::new();
    while let Some(hit) = exec_twice.next().unwrap() {
        rest_twice.push(hit.record_id);
    }

    // Double invalidation and unknown ids change nothing.
    assert_eq!(rest_once, rest_twice);
}

#[test]
fn every_stage_type_keeps_returning_eof() {
    let corpus = build_corpus(31, &["a", "b"], 40, 50);

    let roots: Vec<Box<dyn PlanStage>> = vec![
        Box::new(OrStage::new(corpus.scans(&["a", "b"]))),
        Box::new(TextOrStage::new(
            true,
            TextIndexFormat::default(),
            corpus.scans(&["a", "b"]),
            None,
        )),
        Box::new(TextAndStage::new(
            true,
            TextIndexFormat::default(),
            corpus.scans(&["a", "b"]),
        )),
        Box::new(TextNinStage::new(
            Box::new(OrStage::new(corpus.scans(&["a"]))),
            corpus.scans(&["b"]),
        )),
    ];

    for root in roots {
        let name = root.name();
        let mut exec = PlanExecutor::new(root);
        while exec.next().unwrap().is_some() {}
        for _ in 0..3 {
            assert!(
                exec.next().unwrap().is_none(),
                "{name} produced output after EOF"
            );
        }
    }
}
