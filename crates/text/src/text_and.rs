//! Scoring intersection.
//!
//! Drives its children round-robin through the same record table the
//! scoring union uses, with one twist: a record only *counts* once every
//! child has reported it (it is then "collected"). Until collection the
//! committed score is masked to zero, which parks the record at the tail
//! of the score view, so only collected records ever surface.
//!
//! The intersection filter runs at child EOF: once a child is exhausted,
//! any live record that child never reported can never collect and is
//! purged, its member freed. A record first surfacing *after* some child
//! is already exhausted is dropped on arrival for the same reason.
//!
//! Early emission is the union's proof with the collection gate added:
//! the candidate must be collected on top of being unbeatable.

use crate::error::ExecResult;
use crate::record_table::{RecordTable, ScoreCursor, TextRecordData};
use crate::stage::{PlanStage, WorkState};
use crate::stats::{SpecificStats, StageStats};
use folio_core::index_key::extract_score;
use folio_core::{RecordId, TextIndexFormat, WorkingSet, WorkingSetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadingTerms,
    ReturningResults,
    Done,
}

#[derive(Debug, Clone, Copy)]
struct EmissionBlock {
    required_drop: f64,
    baseline: f64,
}

/// Intersection stage: emits a record iff every child produced it.
pub struct TextAndStage {
    children: Vec<Box<dyn PlanStage>>,
    child_eof: Vec<bool>,
    last_seen: Vec<f64>,
    current_all_terms_score: f64,
    current_child: usize,
    state: State,
    table: RecordTable,
    score_cursor: Option<ScoreCursor>,
    emission_block: Option<EmissionBlock>,
    want_score: bool,
    format: TextIndexFormat,
    single_child: bool,
    dups_tested: u64,
    dups_dropped: u64,
    record_ids_forgotten: u64,
    per_child_advances: Vec<u64>,
}

impl TextAndStage {
    /// Stage type name.
    pub const NAME: &'static str = "TEXT_AND";

    /// Intersection over `children`, fixed at construction.
    pub fn new(
        want_score: bool,
        format: TextIndexFormat,
        children: Vec<Box<dyn PlanStage>>,
    ) -> Self {
        let n = children.len();
        TextAndStage {
            children,
            child_eof: vec![false; n],
            last_seen: vec![0.0; n],
            current_all_terms_score: 0.0,
            current_child: 0,
            state: State::ReadingTerms,
            table: RecordTable::new(),
            score_cursor: None,
            emission_block: None,
            want_score,
            format,
            single_child: false,
            dups_tested: 0,
            dups_dropped: 0,
            record_ids_forgotten: 0,
            per_child_advances: vec![0; n],
        }
    }

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

    /// Per-term score of an advanced member (computed side-channel first,
    /// then the index key), folded into the child's last-seen slot.
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

    /// Single-child fast path: a one-term intersection is the term stream
    /// itself, score re-attached.
    fn read_from_child(&mut self, ws: &mut WorkingSet) -> ExecResult<WorkState> {
        match self.children[0].work(ws)? {
            WorkState::Advanced(id) => {
                if ws.get(id).map(|m| !m.has_record_id()).unwrap_or(true) {
                    ws.flag_for_review(id);
                    return Ok(WorkState::NeedTime);
                }
                self.per_child_advances[0] += 1;
                if self.want_score {
                    let score = self.observe_term_score(ws, id, 0)?;
                    ws.get_mut(id).expect("member is live").set_computed_score(score);
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
                self.per_child_advances[child] += 1;
                let Some(record_id) = ws.get(id).and_then(|m| m.record_id) else {
                    ws.flag_for_review(id);
                    return Ok(WorkState::NeedTime);
                };
                self.dups_tested += 1;
                let score = self.observe_term_score(ws, id, child)?;

                if self.table.contains(record_id) {
                    let mut repeat = false;
                    let seen = &self.last_seen;
                    self.table.update(record_id, |data| {
                        if data.score_terms[child] != 0.0 {
                            repeat = true;
                            return;
                        }
                        data.score_terms[child] = score;
                        data.collected = data.score_terms.iter().all(|s| *s != 0.0);
                        data.score = if data.collected {
                            data.score_terms.iter().sum()
                        } else {
                            0.0
                        };
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
                    if repeat {
                        self.dups_dropped += 1;
                    }
                    // The table keeps the member the first child delivered.
                    ws.free(id);
                    return Ok(WorkState::NeedTime);
                }

                // A record surfacing after some child already ran dry can
                // never be reported by every child.
                if self.child_eof.iter().any(|eof| *eof) {
                    self.dups_dropped += 1;
                    ws.free(id);
                    return Ok(WorkState::NeedTime);
                }

                let mut data = TextRecordData::new(record_id, id, self.children.len());
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
                Ok(WorkState::NeedTime)
            }
            WorkState::Eof => {
                self.child_eof[child] = true;
                self.current_all_terms_score -= self.last_seen[child];
                self.last_seen[child] = 0.0;

                // The intersection filter: everything this child never
                // reported is now unreachable.
                for wsid in self.table.purge_unseen_by_child(child) {
                    ws.free(wsid);
                }
                if self.table.is_empty() {
                    self.state = State::Done;
                    return Ok(WorkState::Eof);
                }
                if !self.child_eof.iter().all(|eof| *eof) {
                    return Ok(WorkState::NeedTime);
                }
                self.score_cursor = None;
                tracing::trace!(
                    target: "folio::text",
                    records = self.table.len(),
                    "TEXT_AND draining record table"
                );
                self.state = State::ReturningResults;
                Ok(WorkState::NeedTime)
            }
            other => Ok(other),
        }
    }

    /// The union's early-emission proof, gated on collection.
    fn return_ready_results(&mut self, ws: &mut WorkingSet) -> ExecResult<Option<WorkState>> {
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
        if top.advanced || !top.collected || top.score == 0.0 {
            return Ok(None);
        }
        if top.score < self.current_all_terms_score {
            return Ok(None);
        }
        let top_id = top.record_id;
        let top_score = top.score;
        let top_wsid = top.wsid;

        loop {
            let Some(entry) = self.table.first_by_predict() else {
                break;
            };
            if entry.advanced || entry.predict_score <= top_score {
                break;
            }
            // An uncollected record's `score` is masked to zero, so the
            // gap must be taken against its unmasked committed sum or the
            // proof would miss nearly-collected front-runners.
            let committed: f64 = entry.score_terms.iter().sum();
            let gap = top_score - committed;
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
            let entry_id = entry.record_id;
            self.table.refresh_predict(entry_id, &self.last_seen);
        }

        self.table.set_advanced(top_id);
        ws.get_mut(top_wsid)
            .expect("member is live")
            .set_computed_score(top_score);
        Ok(Some(WorkState::Advanced(top_wsid)))
    }

    /// Drain collected records in descending score order. Uncollected ones
    /// were purged when their missing child ran dry.
    fn return_results(&mut self, ws: &mut WorkingSet) -> ExecResult<WorkState> {
        let Some((entry, next)) = self.table.next_by_score(self.score_cursor.as_ref()) else {
            self.state = State::Done;
            return Ok(WorkState::Eof);
        };
        if entry.advanced {
            self.state = State::Done;
            return Ok(WorkState::Eof);
        }
        let wsid = entry.wsid;
        let score = entry.score;
        self.score_cursor = Some(next);
        if self.want_score {
            ws.get_mut(wsid)
                .expect("member is live")
                .set_computed_score(score);
        }
        Ok(WorkState::Advanced(wsid))
    }
}

impl PlanStage for TextAndStage {
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
            specific: SpecificStats::TextAnd {
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
