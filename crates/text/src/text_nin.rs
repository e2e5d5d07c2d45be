//! Anti-join over negated terms.
//!
//! The children list is the negation feeders followed by the inner stage
//! (the already-composed positive subtree), driven in list order rather
//! than round-robin: every feeder is drained into the exclusion set before
//! the inner stage produces its first record. Inner records whose id landed in
//! the exclusion set are freed and dropped; the rest pass through
//! untouched.

use crate::error::ExecResult;
use crate::stage::{PlanStage, WorkState};
use crate::stats::{SpecificStats, StageStats};
use folio_core::{RecordId, WorkingSet};
use rustc_hash::FxHashSet;

/// Negation stage: emit from the inner stage only what no negated-term
/// feeder produced.
pub struct TextNinStage {
    /// Feeders first, inner stage last.
    children: Vec<Box<dyn PlanStage>>,
    current_child: usize,
    excluded: FxHashSet<RecordId>,
    dups_tested: u64,
    dups_dropped: u64,
    docs_rejected: u64,
    record_ids_forgotten: u64,
    per_child_advances: Vec<u64>,
}

impl TextNinStage {
    /// Stage type name.
    pub const NAME: &'static str = "TEXT_NIN";

    /// Wrap `inner`, excluding every record id the `feeders` produce.
    pub fn new(inner: Box<dyn PlanStage>, feeders: Vec<Box<dyn PlanStage>>) -> Self {
        let mut children = feeders;
        children.push(inner);
        let n = children.len();
        TextNinStage {
            children,
            current_child: 0,
            excluded: FxHashSet::default(),
            dups_tested: 0,
            dups_dropped: 0,
            docs_rejected: 0,
            record_ids_forgotten: 0,
            per_child_advances: vec![0; n],
        }
    }

    fn on_inner(&self) -> bool {
        self.current_child == self.children.len() - 1
    }
}

impl PlanStage for TextNinStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn work(&mut self, ws: &mut WorkingSet) -> ExecResult<WorkState> {
        if self.is_eof() {
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

                if self.on_inner() {
                    if self.excluded.contains(&record_id) {
                        self.docs_rejected += 1;
                        ws.free(id);
                        return Ok(WorkState::NeedTime);
                    }
                    return Ok(WorkState::Advanced(id));
                }

                // Feeder: record the exclusion, release the member.
                self.dups_tested += 1;
                if !self.excluded.insert(record_id) {
                    self.dups_dropped += 1;
                }
                ws.free(id);
                Ok(WorkState::NeedTime)
            }
            WorkState::Eof => {
                self.current_child += 1;
                if self.is_eof() {
                    Ok(WorkState::Eof)
                } else {
                    Ok(WorkState::NeedTime)
                }
            }
            other => Ok(other),
        }
    }

    fn is_eof(&self) -> bool {
        self.current_child >= self.children.len()
    }

    fn invalidate(&mut self, ws: &mut WorkingSet, id: RecordId) {
        for child in &mut self.children {
            child.invalidate(ws, id);
        }
        // A deleted record reappearing under the same id is a different
        // document and must not inherit the exclusion.
        if self.excluded.remove(&id) {
            self.record_ids_forgotten += 1;
        }
    }

    fn stats(&self) -> StageStats {
        StageStats {
            stage: Self::NAME.to_string(),
            specific: SpecificStats::TextNin {
                dups_tested: self.dups_tested,
                dups_dropped: self.dups_dropped,
                docs_rejected: self.docs_rejected,
                record_ids_forgotten: self.record_ids_forgotten,
                per_child_advances: self.per_child_advances.clone(),
            },
            children: self.children.iter().map(|c| c.stats()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::ScanBounds;
    use crate::memory::MemoryTextIndex;
    use crate::or_stage::OrStage;
    use crate::scan::IndexScanStage;
    use folio_core::TextIndexFormat;
    use std::sync::Arc;

    fn scan(term: &str, index: &Arc<MemoryTextIndex>) -> Box<dyn PlanStage> {
        Box::new(IndexScanStage::new(
            index.clone(),
            ScanBounds::for_term(&[], term),
            TextIndexFormat::default(),
        ))
    }

    fn drain(stage: &mut TextNinStage, ws: &mut WorkingSet) -> Vec<RecordId> {
        let mut out = Vec::new();
        loop {
            match stage.work(ws).unwrap() {
                WorkState::Advanced(id) => out.push(ws.get(id).unwrap().record_id.unwrap()),
                WorkState::NeedTime | WorkState::NeedYield(_) => continue,
                WorkState::Eof => return out,
            }
        }
    }

    #[test]
    fn test_negation_filters_inner_stream() {
        let mut index = MemoryTextIndex::new(TextIndexFormat::default());
        index.insert_posting("p", RecordId(1), 1.0);
        index.insert_posting("p", RecordId(2), 1.0);
        index.insert_posting("p", RecordId(3), 1.0);
        index.insert_posting("n", RecordId(2), 0.4);
        index.seal();
        let index = Arc::new(index);

        let mut ws = WorkingSet::new();
        let inner = Box::new(OrStage::new(vec![scan("p", &index)]));
        let mut stage = TextNinStage::new(inner, vec![scan("n", &index)]);

        let mut out = drain(&mut stage, &mut ws);
        out.sort();
        assert_eq!(out, vec![RecordId(1), RecordId(3)]);
        match stage.stats().specific {
            SpecificStats::TextNin { docs_rejected, .. } => assert_eq!(docs_rejected, 1),
            other => panic!("wrong stats {other:?}"),
        }
        // Feeder members and the rejected inner member were all freed.
        assert_eq!(ws.live(), 2);
    }

    #[test]
    fn test_multiple_feeders_union_their_exclusions() {
        let mut index = MemoryTextIndex::new(TextIndexFormat::default());
        for id in 1..=4 {
            index.insert_posting("p", RecordId(id), 1.0);
        }
        index.insert_posting("n1", RecordId(1), 0.2);
        index.insert_posting("n2", RecordId(3), 0.2);
        index.insert_posting("n2", RecordId(1), 0.1); // overlaps n1
        index.seal();
        let index = Arc::new(index);

        let mut ws = WorkingSet::new();
        let inner = Box::new(OrStage::new(vec![scan("p", &index)]));
        let mut stage =
            TextNinStage::new(inner, vec![scan("n1", &index), scan("n2", &index)]);

        let mut out = drain(&mut stage, &mut ws);
        out.sort();
        assert_eq!(out, vec![RecordId(2), RecordId(4)]);
        match stage.stats().specific {
            SpecificStats::TextNin { dups_dropped, .. } => assert_eq!(dups_dropped, 1),
            other => panic!("wrong stats {other:?}"),
        }
    }

    #[test]
    fn test_invalidate_forgets_exclusion() {
        let mut index = MemoryTextIndex::new(TextIndexFormat::default());
        index.insert_posting("p", RecordId(1), 1.0);
        index.insert_posting("n", RecordId(1), 0.5);
        index.seal();
        let index = Arc::new(index);

        let mut ws = WorkingSet::new();
        let inner = Box::new(OrStage::new(vec![scan("p", &index)]));
        let mut stage = TextNinStage::new(inner, vec![scan("n", &index)]);

        // Drain the feeder, then invalidate: the reborn d1 must pass.
        loop {
            stage.work(&mut ws).unwrap();
            if stage.current_child == 1 {
                break;
            }
        }
        stage.invalidate(&mut ws, RecordId(1));

        let out = drain(&mut stage, &mut ws);
        assert_eq!(out, vec![RecordId(1)]);
    }

    #[test]
    fn test_empty_feeders_pass_everything() {
        let mut index = MemoryTextIndex::new(TextIndexFormat::default());
        index.insert_posting("p", RecordId(5), 1.0);
        index.insert_posting("n", RecordId(99), 1.0); // never overlaps
        index.seal();
        let index = Arc::new(index);

        let mut ws = WorkingSet::new();
        let inner = Box::new(OrStage::new(vec![scan("p", &index)]));
        let mut stage = TextNinStage::new(inner, vec![scan("n", &index)]);

        assert_eq!(drain(&mut stage, &mut ws), vec![RecordId(5)]);
    }
}
