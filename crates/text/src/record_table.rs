//! Multi-indexed record table for the scoring stages.
//!
//! TEXT_OR and TEXT_AND accumulate one [`TextRecordData`] per distinct
//! record id and need three concurrently consistent views over the same
//! set:
//!
//! - a **hash view** keyed by record id, for point lookups on every child
//!   advance,
//! - a **score view** ordered by descending committed score, walked when
//!   results are returned,
//! - a **predict view** ordered by descending upper-bound score, walked by
//!   the early-emission proof.
//!
//! The hash map is the primary storage; the ordered views are sets of
//! compact keys. A mutation removes the affected keys, applies the change,
//! and reinserts, so every view is consistent again before the call
//! returns.
//!
//! Ordering: records already emitted (`advanced`) sort to the tail of both
//! views and their effective ordering score reads zero; live records sort
//! by descending score with ties broken by insertion order.

use folio_core::{RecordId, WorkingSetId};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::ops::Bound;

// ============================================================================
// TextRecordData
// ============================================================================

/// Per-record accumulation state.
#[derive(Debug, Clone)]
pub struct TextRecordData {
    /// Primary key, unique within the table.
    pub record_id: RecordId,
    /// Working-set handle carrying the record's fetched context.
    pub wsid: WorkingSetId,
    /// Committed score: sum of the per-term scores observed so far. In an
    /// intersection this stays zero until the record is collected.
    pub score: f64,
    /// Upper bound: `score` plus, for each child not yet observed on this
    /// record, the last per-term score that child emitted.
    pub predict_score: f64,
    /// Whether the record has already been emitted.
    pub advanced: bool,
    /// Intersection only: every child has contributed.
    pub collected: bool,
    /// Per-child contribution; zero means "not yet observed for this child".
    pub score_terms: Vec<f64>,
    /// Per-child prediction, refreshed lazily from the upstream last-seen
    /// scores.
    pub score_predict_terms: Vec<f64>,
    /// Insertion order, the tie-break of both ordered views.
    seq: u64,
}

impl TextRecordData {
    /// Fresh record with all contributions unobserved.
    pub fn new(record_id: RecordId, wsid: WorkingSetId, num_children: usize) -> Self {
        TextRecordData {
            record_id,
            wsid,
            score: 0.0,
            predict_score: 0.0,
            advanced: false,
            collected: false,
            score_terms: vec![0.0; num_children],
            score_predict_terms: vec![0.0; num_children],
            seq: 0,
        }
    }
}

// ============================================================================
// View keys
// ============================================================================

/// Compact ordering key for one record in one view.
///
/// Sort order: live records before advanced ones, then descending score,
/// then insertion order. The effective score of an advanced record is zero.
#[derive(Debug, Clone, Copy)]
struct ViewKey {
    advanced: bool,
    score: f64,
    seq: u64,
    id: RecordId,
}

impl PartialEq for ViewKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for ViewKey {}

impl PartialOrd for ViewKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ViewKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.advanced
            .cmp(&other.advanced)
            .then(other.score.total_cmp(&self.score))
            .then(self.seq.cmp(&other.seq))
    }
}

fn score_key(data: &TextRecordData) -> ViewKey {
    ViewKey {
        advanced: data.advanced,
        score: if data.advanced { 0.0 } else { data.score },
        seq: data.seq,
        id: data.record_id,
    }
}

fn predict_key(data: &TextRecordData) -> ViewKey {
    ViewKey {
        advanced: data.advanced,
        score: if data.advanced { 0.0 } else { data.predict_score },
        seq: data.seq,
        id: data.record_id,
    }
}

/// Opaque position in the score view, surviving table mutation (the walk
/// resumes strictly after the recorded key).
#[derive(Debug, Clone)]
pub struct ScoreCursor {
    key: ViewKey,
}

// ============================================================================
// RecordTable
// ============================================================================

/// The table. Owns its [`TextRecordData`] entries; working-set members stay
/// owned by the arena, the table holds only the opaque handles.
#[derive(Debug, Default)]
pub struct RecordTable {
    records: FxHashMap<RecordId, TextRecordData>,
    by_score: BTreeSet<ViewKey>,
    by_predict: BTreeSet<ViewKey>,
    next_seq: u64,
}

impl RecordTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size the hash view for `additional` more records.
    pub fn reserve(&mut self, additional: usize) {
        self.records.reserve(additional);
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no records are held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Point lookup by record id.
    pub fn get(&self, id: RecordId) -> Option<&TextRecordData> {
        self.records.get(&id)
    }

    /// Whether a record id is present.
    pub fn contains(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }

    /// Insert a fresh record. Returns false (and leaves the table
    /// untouched) if the id is already present.
    pub fn insert(&mut self, mut data: TextRecordData) -> bool {
        if self.records.contains_key(&data.record_id) {
            return false;
        }
        data.seq = self.next_seq;
        self.next_seq += 1;
        self.by_score.insert(score_key(&data));
        self.by_predict.insert(predict_key(&data));
        self.records.insert(data.record_id, data);
        true
    }

    /// Apply `mutate` to the record and reindex both ordered views.
    /// Returns false if the id is unknown.
    pub fn update(&mut self, id: RecordId, mutate: impl FnOnce(&mut TextRecordData)) -> bool {
        let Some(data) = self.records.get_mut(&id) else {
            return false;
        };
        self.by_score.remove(&score_key(data));
        self.by_predict.remove(&predict_key(data));
        mutate(data);
        self.by_score.insert(score_key(data));
        self.by_predict.insert(predict_key(data));
        true
    }

    /// Mark a record as emitted, moving it to the tail of both views.
    pub fn set_advanced(&mut self, id: RecordId) {
        self.update(id, |data| data.advanced = true);
    }

    /// Recompute a record's prediction from the upstream last-seen scores:
    /// each unobserved child contributes its last-seen score, each observed
    /// child its committed contribution.
    pub fn refresh_predict(&mut self, id: RecordId, last_seen: &[f64]) {
        self.update(id, |data| {
            let mut predicted = 0.0;
            for (i, slot) in data.score_predict_terms.iter_mut().enumerate() {
                *slot = if data.score_terms[i] != 0.0 {
                    data.score_terms[i]
                } else {
                    last_seen[i]
                };
                predicted += *slot;
            }
            data.predict_score = predicted;
        });
    }

    /// Remove a record, returning it (the caller owns the wsid decision).
    pub fn erase(&mut self, id: RecordId) -> Option<TextRecordData> {
        let data = self.records.remove(&id)?;
        self.by_score.remove(&score_key(&data));
        self.by_predict.remove(&predict_key(&data));
        Some(data)
    }

    /// Remove every live record the given child never reported, returning
    /// the working-set handles so the caller can free the members. This is
    /// the intersection filter applied at a child's EOF.
    pub fn purge_unseen_by_child(&mut self, child: usize) -> Vec<WorkingSetId> {
        let doomed: Vec<RecordId> = self
            .records
            .values()
            .filter(|data| !data.advanced && data.score_terms[child] == 0.0)
            .map(|data| data.record_id)
            .collect();
        doomed
            .into_iter()
            .filter_map(|id| self.erase(id).map(|data| data.wsid))
            .collect()
    }

    /// Highest-score record (live records first; an advanced record here
    /// means nothing live remains).
    pub fn first_by_score(&self) -> Option<&TextRecordData> {
        self.by_score.first().map(|key| &self.records[&key.id])
    }

    /// Highest-prediction record.
    pub fn first_by_predict(&self) -> Option<&TextRecordData> {
        self.by_predict.first().map(|key| &self.records[&key.id])
    }

    /// Walk the score view: the first record strictly after `cursor`
    /// (or the head when `cursor` is `None`), plus the position to resume
    /// from. Records erased behind the cursor do not disturb the walk.
    pub fn next_by_score(
        &self,
        cursor: Option<&ScoreCursor>,
    ) -> Option<(&TextRecordData, ScoreCursor)> {
        let key = match cursor {
            Some(c) => self
                .by_score
                .range((Bound::Excluded(c.key), Bound::Unbounded))
                .next()?,
            None => self.by_score.first()?,
        };
        Some((&self.records[&key.id], ScoreCursor { key: *key }))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, wsid: u32, children: usize) -> TextRecordData {
        TextRecordData::new(RecordId(id), WorkingSetId(wsid), children)
    }

    fn scored(id: i64, wsid: u32, score: f64) -> TextRecordData {
        let mut data = record(id, wsid, 2);
        data.score = score;
        data.predict_score = score;
        data.score_terms[0] = score;
        data.score_predict_terms[0] = score;
        data
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut table = RecordTable::new();
        assert!(table.insert(scored(1, 10, 2.0)));
        assert!(table.insert(scored(2, 11, 3.0)));
        assert!(!table.insert(scored(1, 12, 9.0))); // duplicate id refused

        assert_eq!(table.len(), 2);
        assert!(table.contains(RecordId(1)));
        assert_eq!(table.get(RecordId(2)).unwrap().wsid, WorkingSetId(11));
    }

    #[test]
    fn test_score_view_descends() {
        let mut table = RecordTable::new();
        table.insert(scored(1, 0, 1.0));
        table.insert(scored(2, 1, 5.0));
        table.insert(scored(3, 2, 3.0));

        assert_eq!(table.first_by_score().unwrap().record_id, RecordId(2));

        let (first, c1) = table.next_by_score(None).unwrap();
        assert_eq!(first.record_id, RecordId(2));
        let (second, c2) = table.next_by_score(Some(&c1)).unwrap();
        assert_eq!(second.record_id, RecordId(3));
        let (third, c3) = table.next_by_score(Some(&c2)).unwrap();
        assert_eq!(third.record_id, RecordId(1));
        assert!(table.next_by_score(Some(&c3)).is_none());
    }

    #[test]
    fn test_equal_scores_keep_insertion_order() {
        let mut table = RecordTable::new();
        table.insert(scored(7, 0, 2.0));
        table.insert(scored(3, 1, 2.0));
        table.insert(scored(5, 2, 2.0));

        let (first, c1) = table.next_by_score(None).unwrap();
        let (second, c2) = table.next_by_score(Some(&c1)).unwrap();
        let (third, _) = table.next_by_score(Some(&c2)).unwrap();
        assert_eq!(
            [first.record_id, second.record_id, third.record_id],
            [RecordId(7), RecordId(3), RecordId(5)]
        );
    }

    #[test]
    fn test_update_reindexes_views() {
        let mut table = RecordTable::new();
        table.insert(scored(1, 0, 1.0));
        table.insert(scored(2, 1, 2.0));

        table.update(RecordId(1), |data| {
            data.score = 10.0;
            data.predict_score = 10.0;
        });

        assert_eq!(table.first_by_score().unwrap().record_id, RecordId(1));
        assert_eq!(table.first_by_predict().unwrap().record_id, RecordId(1));
    }

    #[test]
    fn test_advanced_moves_to_tail_of_both_views() {
        let mut table = RecordTable::new();
        table.insert(scored(1, 0, 9.0));
        table.insert(scored(2, 1, 1.0));

        table.set_advanced(RecordId(1));

        // Live record with a far lower score now leads both views.
        assert_eq!(table.first_by_score().unwrap().record_id, RecordId(2));
        assert_eq!(table.first_by_predict().unwrap().record_id, RecordId(2));

        // The advanced record is still reachable at the tail, flagged.
        let (_, c1) = table.next_by_score(None).unwrap();
        let (tail, _) = table.next_by_score(Some(&c1)).unwrap();
        assert_eq!(tail.record_id, RecordId(1));
        assert!(tail.advanced);
    }

    #[test]
    fn test_advanced_outranks_zero_score_live_records() {
        let mut table = RecordTable::new();
        table.insert(scored(1, 0, 4.0));
        table.insert(record(2, 1, 2)); // live, committed score zero

        table.set_advanced(RecordId(1));

        // The live zero-score record must still sort before the emitted one.
        assert_eq!(table.first_by_score().unwrap().record_id, RecordId(2));
    }

    #[test]
    fn test_refresh_predict() {
        let mut table = RecordTable::new();
        let mut data = record(1, 0, 3);
        data.score = 2.0;
        data.score_terms = vec![2.0, 0.0, 0.0];
        data.predict_score = 9.0; // stale
        data.score_predict_terms = vec![2.0, 4.0, 3.0];
        table.insert(data);

        table.refresh_predict(RecordId(1), &[1.5, 0.5, 0.25]);

        let fresh = table.get(RecordId(1)).unwrap();
        assert_eq!(fresh.score_predict_terms, vec![2.0, 0.5, 0.25]);
        assert_eq!(fresh.predict_score, 2.75);
    }

    #[test]
    fn test_erase_fixes_all_views() {
        let mut table = RecordTable::new();
        table.insert(scored(1, 0, 5.0));
        table.insert(scored(2, 1, 3.0));

        let gone = table.erase(RecordId(1)).unwrap();
        assert_eq!(gone.wsid, WorkingSetId(0));
        assert_eq!(table.len(), 1);
        assert_eq!(table.first_by_score().unwrap().record_id, RecordId(2));
        assert!(table.erase(RecordId(1)).is_none());
    }

    #[test]
    fn test_cursor_survives_erase_behind_it() {
        let mut table = RecordTable::new();
        table.insert(scored(1, 0, 5.0));
        table.insert(scored(2, 1, 3.0));
        table.insert(scored(3, 2, 1.0));

        let (_, c1) = table.next_by_score(None).unwrap();
        table.erase(RecordId(1)); // behind the cursor
        let (next, _) = table.next_by_score(Some(&c1)).unwrap();
        assert_eq!(next.record_id, RecordId(2));
    }

    #[test]
    fn test_purge_unseen_by_child() {
        let mut table = RecordTable::new();
        let mut both = record(1, 0, 2);
        both.score_terms = vec![1.0, 1.0];
        table.insert(both);
        let mut only_first = record(2, 1, 2);
        only_first.score_terms = vec![1.0, 0.0];
        table.insert(only_first);

        let freed = table.purge_unseen_by_child(1);
        assert_eq!(freed, vec![WorkingSetId(1)]);
        assert!(table.contains(RecordId(1)));
        assert!(!table.contains(RecordId(2)));
    }
}
