//! Scoring union with early emission.
//!
//! The central composition stage. Children are index scans (or intersection
//! stages standing in for multi-term phrases); each posting a child yields
//! is folded into the record table keyed by record id, accumulating the
//! committed score (sum of per-term contributions observed so far) and an
//! upper-bound prediction: committed score plus, per unobserved child, the
//! last score that child emitted (posting streams descend, so that is the
//! best the child can still contribute).
//!
//! While reading, the stage may emit the table's best record *before* the
//! inputs are drained, if it can prove that no record, seen or unseen, can
//! end up outranking it:
//!
//! - an unseen record can score at most the sum of all live children's
//!   last-seen scores (`current_all_terms_score`), so the candidate must
//!   already beat that;
//! - a partially-seen record can gain at most the last-seen scores of the
//!   children that have not reported it; every table entry whose stored
//!   upper bound beats the candidate is either refuted by that bound (its
//!   prediction was stale and is refreshed below the candidate) or blocks
//!   the emission.
//!
//! A blocked emission caches how much the remaining ceiling must drop
//! before the check can pass again, so subsequent steps short-circuit
//! instead of re-walking the predict view.
//!
//! Once every child is exhausted the stage drains the table in descending
//! committed-score order. Emitted records sort to the tail of both views,
//! which is also the drain's termination condition.

use crate::cursor::DocumentStore;
use crate::error::ExecResult;
use crate::record_table::{RecordTable, ScoreCursor, TextRecordData};
use crate::stage::{PlanStage, WorkState};
use crate::stats::{SpecificStats, StageStats};
use folio_core::index_key::extract_score;
use folio_core::{RecordId, TextIndexFormat, WorkingSet, WorkingSetId};
use std::sync::Arc;

/// Initial record-table reservation; grown as the table fills.
const MIN_TABLE_RESERVE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Draining children and building the table; may emit early.
    ReadingTerms,
    /// Children exhausted; draining the table in score order.
    ReturningResults,
    /// Terminal.
    Done,
}

/// Cached refusal from a blocked early emission: retry only once the
/// remaining ceiling (`current_all_terms_score`) has dropped `required_drop`
/// below the `baseline` recorded when the refusal happened.
#[derive(Debug, Clone, Copy)]
struct EmissionBlock {
    required_drop: f64,
    baseline: f64,
}

/// Scoring union stage.
pub struct TextOrStage {
    children: Vec<Box<dyn PlanStage>>,
    child_eof: Vec<bool>,
    /// Last per-term score observed per child; zero once the child is EOF.
    last_seen: Vec<f64>,
    /// Sum of `last_seen`: the ceiling on any unseen record's final score.
    current_all_terms_score: f64,
    current_child: usize,
    state: State,
    table: RecordTable,
    reserved: usize,
    score_cursor: Option<ScoreCursor>,
    emission_block: Option<EmissionBlock>,
    want_score: bool,
    format: TextIndexFormat,
    /// When present, emitted members get their body materialized here
    /// (the fetch step is absorbed into this stage's output path).
    store: Option<Arc<dyn DocumentStore>>,
    single_child: bool,
    dups_tested: u64,
    dups_dropped: u64,
    record_ids_forgotten: u64,
    per_child_advances: Vec<u64>,
}

impl TextOrStage {
    /// Stage type name.
    pub const NAME: &'static str = "TEXT_OR";

    /// Union over `children`. With `want_score` the stage scores and
    /// reorders; without, it degrades to a dedup union through the same
    /// table. `store` enables the absorbed fetch on the output path.
    pub fn new(
        want_score: bool,
        format: TextIndexFormat,
        children: Vec<Box<dyn PlanStage>>,
        store: Option<Arc<dyn DocumentStore>>,
    ) -> Self {
        let n = children.len();
        let mut table = RecordTable::new();
        table.reserve(MIN_TABLE_RESERVE);
        TextOrStage {
            children,
            child_eof: vec![false; n],
            last_seen: vec![0.0; n],
            current_all_terms_score: 0.0,
            current_child: 0,
            state: State::ReadingTerms,
            table,
            reserved: MIN_TABLE_RESERVE,
            score_cursor: None,
            emission_block: None,
            want_score,
            format,
            store,
            single_child: false,
            dups_tested: 0,
            dups_dropped: 0,
            record_ids_forgotten: 0,
            per_child_advances: vec![0; n],
        }
    }

    /// Rotate to the next non-EOF child. False when every child is done.
    fn rotate(&mut self) -> bool {
        let mut remaining = self.children.len();
        while remaining > 0 {
            self.current_child = (self.current_child + 1) % self.children.len();
            if !self.child_eof[self.current_child] {
                return true;
            }
            remaining -= 1;
        }
        false
    }

    /// Read the per-term score off an advanced member: a child that already
    /// computed an aggregate (an intersection standing in for a phrase)
    /// reports it through the computed side-channel, otherwise the score is
    /// re-extracted from the index key. Also folds the value into the
    /// child's last-seen slot and the global ceiling.
    fn observe_term_score(
        &mut self,
        ws: &WorkingSet,
        wsid: WorkingSetId,
        child: usize,
    ) -> ExecResult<f64> {
        let member = ws.get(wsid).expect("advanced member is live");
        let score = match member.computed_score {
            Some(computed) => computed,
            None => {
                let blob = member.key_blob.as_ref().ok_or(
                    folio_core::Error::MalformedIndexKey {
                        reason: "scored member carries no index key".to_string(),
                    },
                )?;
                extract_score(blob, &self.format)?
            }
        };
        self.current_all_terms_score -= self.last_seen[child];
        self.last_seen[child] = score;
        self.current_all_terms_score += score;
        Ok(score)
    }

    /// Materialize the body on an outgoing member when a store is attached.
    /// False means the record vanished underneath us.
    fn fetch_into(&mut self, ws: &mut WorkingSet, wsid: WorkingSetId) -> bool {
        let Some(store) = &self.store else {
            return true;
        };
        let Some(record_id) = ws.get(wsid).and_then(|m| m.record_id) else {
            return false;
        };
        match store.fetch(record_id) {
            Some(body) => {
                ws.get_mut(wsid).expect("member is live").body = Some(body);
                true
            }
            None => false,
        }
    }

    /// Single-child fast path: no table, forward each advance with the
    /// per-term score attached.
    fn read_from_child(&mut self, ws: &mut WorkingSet) -> ExecResult<WorkState> {
        match self.children[0].work(ws)? {
            WorkState::Advanced(id) => {
                if ws.get(id).map(|m| !m.has_record_id()).unwrap_or(true) {
                    ws.flag_for_review(id);
                    return Ok(WorkState::NeedTime);
                }
                self.per_child_advances[0] += 1;
                if !self.want_score {
                    return Ok(WorkState::Advanced(id));
                }
                let score = self.observe_term_score(ws, id, 0)?;
                ws.get_mut(id).expect("member is live").set_computed_score(score);
                if !self.fetch_into(ws, id) {
                    ws.flag_for_review(id);
                    return Ok(WorkState::NeedTime);
                }
                Ok(WorkState::Advanced(id))
            }
            WorkState::Eof => {
                self.state = State::Done;
                Ok(WorkState::Eof)
            }
            other => Ok(other),
        }
    }

    /// Drive one step on the next non-EOF child and fold the outcome into
    /// the table.
    fn read_from_children(&mut self, ws: &mut WorkingSet) -> ExecResult<WorkState> {
        if self.children.is_empty() {
            self.state = State::Done;
            return Ok(WorkState::Eof);
        }
        if !self.rotate() {
            return Ok(WorkState::Eof);
        }
        let child = self.current_child;

        match self.children[child].work(ws)? {
            WorkState::Advanced(id) => {
                let Some(record_id) = ws.get(id).and_then(|m| m.record_id) else {
                    // The child saw an invalidation; record ids are what we
                    // merge on, so the member is useless here.
                    ws.flag_for_review(id);
                    return Ok(WorkState::NeedTime);
                };
                self.dups_tested += 1;

                if self.reserved < self.table.len() {
                    let grow = self.table.len() * self.children.len();
                    self.reserved += grow;
                    self.table.reserve(grow);
                }

                if !self.want_score {
                    if self.table.contains(record_id) {
                        self.dups_dropped += 1;
                        ws.free(id);
                        return Ok(WorkState::NeedTime);
                    }
                    self.table
                        .insert(TextRecordData::new(record_id, id, self.children.len()));
                    self.per_child_advances[child] += 1;
                    return Ok(WorkState::Advanced(id));
                }

                let score = self.observe_term_score(ws, id, child)?;
                if !self.table.contains(record_id) {
                    let mut data = TextRecordData::new(record_id, id, self.children.len());
                    data.score = score;
                    data.score_terms[child] = score;
                    let mut predicted = score;
                    for i in 0..self.children.len() {
                        if i == child {
                            data.score_predict_terms[i] = score;
                        } else {
                            data.score_predict_terms[i] = self.last_seen[i];
                            predicted += self.last_seen[i];
                        }
                    }
                    data.predict_score = predicted;
                    self.table.insert(data);
                } else {
                    self.dups_dropped += 1;
                    let seen = &self.last_seen;
                    self.table.update(record_id, |data| {
                        data.score += score;
                        data.score_terms[child] = score;
                        let mut predicted = 0.0;
                        for i in 0..data.score_terms.len() {
                            data.score_predict_terms[i] = if data.score_terms[i] != 0.0 {
                                data.score_terms[i]
                            } else {
                                seen[i]
                            };
                            predicted += data.score_predict_terms[i];
                        }
                        data.predict_score = predicted;
                    });
                    // The table keeps the member it saw first.
                    ws.free(id);
                }
                Ok(WorkState::NeedTime)
            }
            WorkState::Eof => {
                self.child_eof[child] = true;
                self.current_all_terms_score -= self.last_seen[child];
                self.last_seen[child] = 0.0;
                if !self.child_eof.iter().all(|eof| *eof) {
                    return Ok(WorkState::NeedTime);
                }
                self.score_cursor = None;
                if !self.want_score {
                    self.state = State::Done;
                    return Ok(WorkState::Eof);
                }
                tracing::trace!(
                    target: "folio::text",
                    records = self.table.len(),
                    "TEXT_OR draining record table"
                );
                self.state = State::ReturningResults;
                Ok(WorkState::NeedTime)
            }
            other => Ok(other),
        }
    }

    /// The early-emission check. `None` means no record qualifies yet and
    /// the dispatcher should go read children instead.
    fn return_ready_results(&mut self, ws: &mut WorkingSet) -> ExecResult<Option<WorkState>> {
        // A prior refusal recorded how much the ceiling must fall before
        // the walk is worth repeating.
        if let Some(block) = self.emission_block {
            if block.baseline - self.current_all_terms_score < block.required_drop {
                return Ok(None);
            }
            self.emission_block = None;
        }

        if self.table.len() < 2 {
            return Ok(None);
        }
        if self.current_all_terms_score == 0.0 {
            return Ok(None);
        }
        let Some(top) = self.table.first_by_score() else {
            return Ok(None);
        };
        if top.advanced || top.score == 0.0 {
            return Ok(None);
        }
        // A record none of the children have surfaced yet could still
        // accrue every child's last-seen score.
        if top.score < self.current_all_terms_score {
            return Ok(None);
        }
        let top_id = top.record_id;
        let top_score = top.score;
        let top_wsid = top.wsid;

        // Walk the predict view while stored upper bounds beat the
        // candidate. The candidate's own entry participates: while any of
        // its children can still contribute, its bound exceeds its score
        // and blocks the emission, which keeps the committed score equal
        // to the full sum at emission time.
        loop {
            let Some(entry) = self.table.first_by_predict() else {
                break;
            };
            if entry.advanced || entry.predict_score <= top_score {
                break;
            }
            let gap = top_score - entry.score;
            let max_future_gain: f64 = entry
                .score_terms
                .iter()
                .enumerate()
                .filter(|(_, contribution)| **contribution == 0.0)
                .map(|(i, _)| self.last_seen[i])
                .sum();
            if gap < max_future_gain {
                self.emission_block = Some(EmissionBlock {
                    required_drop: max_future_gain - gap,
                    baseline: self.current_all_terms_score,
                });
                return Ok(None);
            }
            // The stored bound was stale. Refreshing it lands at
            // `entry.score + max_future_gain <= top_score`, which removes
            // the entry from this walk, so the loop terminates.
            let entry_id = entry.record_id;
            self.table.refresh_predict(entry_id, &self.last_seen);
        }

        // Proof complete: nothing can overtake the candidate.
        if !self.fetch_into(ws, top_wsid) {
            self.table.erase(top_id);
            ws.flag_for_review(top_wsid);
            self.record_ids_forgotten += 1;
            return Ok(Some(WorkState::NeedTime));
        }
        self.table.set_advanced(top_id);
        ws.get_mut(top_wsid)
            .expect("member is live")
            .set_computed_score(top_score);
        self.per_child_advances[self.current_child] += 1;
        Ok(Some(WorkState::Advanced(top_wsid)))
    }

    /// Drain the score view after all children are exhausted.
    fn return_results(&mut self, ws: &mut WorkingSet) -> ExecResult<WorkState> {
        let Some((entry, next)) = self.table.next_by_score(self.score_cursor.as_ref()) else {
            self.state = State::Done;
            return Ok(WorkState::Eof);
        };
        if entry.advanced {
            // Everything past this point was emitted early.
            self.state = State::Done;
            return Ok(WorkState::Eof);
        }
        let wsid = entry.wsid;
        let score = entry.score;
        self.score_cursor = Some(next);

        if !self.fetch_into(ws, wsid) {
            ws.flag_for_review(wsid);
            return Ok(WorkState::NeedTime);
        }
        ws.get_mut(wsid)
            .expect("member is live")
            .set_computed_score(score);
        Ok(WorkState::Advanced(wsid))
    }
}

impl PlanStage for TextOrStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn work(&mut self, ws: &mut WorkingSet) -> ExecResult<WorkState> {
        if self.state == State::Done {
            return Ok(WorkState::Eof);
        }

        if self.children.len() == 1 {
            self.single_child = true;
            return self.read_from_child(ws);
        }

        match self.state {
            State::ReadingTerms => {
                if self.want_score {
                    if let Some(ready) = self.return_ready_results(ws)? {
                        return Ok(ready);
                    }
                }
                self.read_from_children(ws)
            }
            State::ReturningResults => self.return_results(ws),
            State::Done => unreachable!("handled above"),
        }
    }

    fn is_eof(&self) -> bool {
        self.state == State::Done
    }

    fn invalidate(&mut self, ws: &mut WorkingSet, id: RecordId) {
        for child in &mut self.children {
            child.invalidate(ws, id);
        }
        if let Some(data) = self.table.erase(id) {
            ws.flag_for_review(data.wsid);
            self.record_ids_forgotten += 1;
        }
    }

    fn stats(&self) -> StageStats {
        StageStats {
            stage: Self::NAME.to_string(),
            specific: SpecificStats::TextOr {
                want_text_score: self.want_score,
                single_child: self.single_child,
                dups_tested: self.dups_tested,
                dups_dropped: self.dups_dropped,
                record_ids_forgotten: self.record_ids_forgotten,
                per_child_advances: self.per_child_advances.clone(),
            },
            children: self.children.iter().map(|c| c.stats()).collect(),
        }
    }
}
