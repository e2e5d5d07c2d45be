//! Non-scoring union with record-id deduplication.
//!
//! Round-robins over its children and forwards each record id the first
//! time it surfaces; repeats are freed and dropped. Order across children
//! is whatever the interleaving produces; callers that need score order
//! use the scoring union instead.

use crate::error::ExecResult;
use crate::stage::{PlanStage, WorkState};
use crate::stats::{SpecificStats, StageStats};
use folio_core::{RecordId, WorkingSet};
use rustc_hash::FxHashSet;

/// Deduplicating union stage.
pub struct OrStage {
    children: Vec<Box<dyn PlanStage>>,
    child_eof: Vec<bool>,
    current_child: usize,
    seen: FxHashSet<RecordId>,
    dups_tested: u64,
    dups_dropped: u64,
    record_ids_forgotten: u64,
}

impl OrStage {
    /// Stage type name.
    pub const NAME: &'static str = "OR";

    /// Union over `children`, fixed at construction.
    pub fn new(children: Vec<Box<dyn PlanStage>>) -> Self {
        let n = children.len();
        OrStage {
            children,
            child_eof: vec![false; n],
            current_child: 0,
            seen: FxHashSet::default(),
            dups_tested: 0,
            dups_dropped: 0,
            record_ids_forgotten: 0,
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
}

impl PlanStage for OrStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn work(&mut self, ws: &mut WorkingSet) -> ExecResult<WorkState> {
        if !self.rotate() {
            return Ok(WorkState::Eof);
        }

        match self.children[self.current_child].work(ws)? {
            WorkState::Advanced(id) => {
                let Some(member) = ws.get(id) else {
                    return Ok(WorkState::NeedTime);
                };
                let Some(record_id) = member.record_id else {
                    // Invalidated upstream; nothing to dedup on.
                    ws.flag_for_review(id);
                    return Ok(WorkState::NeedTime);
                };
                self.dups_tested += 1;
                if self.seen.contains(&record_id) {
                    self.dups_dropped += 1;
                    ws.free(id);
                    return Ok(WorkState::NeedTime);
                }
                self.seen.insert(record_id);
                Ok(WorkState::Advanced(id))
            }
            WorkState::Eof => {
                self.child_eof[self.current_child] = true;
                if self.child_eof.iter().all(|eof| *eof) {
                    Ok(WorkState::Eof)
                } else {
                    Ok(WorkState::NeedTime)
                }
            }
            other => Ok(other),
        }
    }

    fn is_eof(&self) -> bool {
        self.child_eof.iter().all(|eof| *eof)
    }

    fn invalidate(&mut self, ws: &mut WorkingSet, id: RecordId) {
        for child in &mut self.children {
            child.invalidate(ws, id);
        }
        // If the id shows up again it is a different document reusing the
        // id, so it must be allowed through once more.
        if self.seen.remove(&id) {
            self.record_ids_forgotten += 1;
        }
    }

    fn stats(&self) -> StageStats {
        StageStats {
            stage: Self::NAME.to_string(),
            specific: SpecificStats::Or {
                dups_tested: self.dups_tested,
                dups_dropped: self.dups_dropped,
                record_ids_forgotten: self.record_ids_forgotten,
            },
            children: self.children.iter().map(|c| c.stats()).collect(),
        }
    }
}
