//! Query driver.
//!
//! Owns the working set and the stage tree, and pulls the root one step at
//! a time: `Advanced` becomes a hit for the caller, `NeedTime` (and
//! `NeedYield`, which this driver has nothing to release for) loops,
//! `Eof` finishes. The interrupt flag is checked between steps, never
//! mid-step, and cancellation tears the whole tree down by drop, which
//! releases stages, children and cursors in reverse construction order.

use crate::error::{ExecError, ExecResult};
use crate::stage::{PlanStage, WorkState};
use crate::stats::StageStats;
use folio_core::{RecordId, WorkingSet};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One result out of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextHit {
    /// The matching document.
    pub record_id: RecordId,
    /// Aggregate text score, when the query ran in scoring mode.
    pub score: Option<f64>,
}

/// Everything a finished query produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResults {
    /// Hits in emission order (score-descending for scoring queries).
    pub hits: Vec<TextHit>,
    /// Aggregated per-stage counters.
    pub stats: StageStats,
}

/// Single-threaded cooperative driver for one stage tree.
pub struct PlanExecutor {
    root: Box<dyn PlanStage>,
    ws: WorkingSet,
    interrupt: Arc<AtomicBool>,
}

impl PlanExecutor {
    /// Drive `root` with a default-capacity working set.
    pub fn new(root: Box<dyn PlanStage>) -> Self {
        Self::with_working_set(root, WorkingSet::new())
    }

    /// Drive `root` with a caller-provided working set (capacity control).
    pub fn with_working_set(root: Box<dyn PlanStage>, ws: WorkingSet) -> Self {
        PlanExecutor {
            root,
            ws,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared cancellation flag. Setting it makes the next step fail with
    /// [`ExecError::Interrupted`]; dropping the executor then releases
    /// every resource the query held.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    /// Storage-layer notification that a record was physically deleted.
    /// Forwards to every stage in the tree.
    pub fn invalidate(&mut self, id: RecordId) {
        self.root.invalidate(&mut self.ws, id);
    }

    /// Pull the next hit, or `None` at end of stream.
    pub fn next(&mut self) -> ExecResult<Option<TextHit>> {
        loop {
            if self.interrupt.load(Ordering::Acquire) {
                return Err(ExecError::Interrupted);
            }
            match self.root.work(&mut self.ws)? {
                WorkState::Advanced(id) => {
                    if self.ws.is_flagged(id) {
                        continue;
                    }
                    let Some(member) = self.ws.get(id) else {
                        continue;
                    };
                    let Some(record_id) = member.record_id else {
                        continue;
                    };
                    let hit = TextHit {
                        record_id,
                        score: member.computed_score,
                    };
                    // The hit carries everything the caller gets; the
                    // member goes back to the arena.
                    self.ws.free(id);
                    return Ok(Some(hit));
                }
                WorkState::NeedTime | WorkState::NeedYield(_) => continue,
                WorkState::Eof => return Ok(None),
            }
        }
    }

    /// Drain the tree and aggregate the stats.
    pub fn run(&mut self) -> ExecResult<QueryResults> {
        let mut hits = Vec::new();
        while let Some(hit) = self.next()? {
            hits.push(hit);
        }
        let stats = self.root.stats();
        tracing::debug!(
            target: "folio::text",
            hits = hits.len(),
            stages = stats.tree_size(),
            flagged = self.ws.flagged_count(),
            "text query complete"
        );
        Ok(QueryResults { hits, stats })
    }

    /// Counter snapshot without draining.
    pub fn stats(&self) -> StageStats {
        self.root.stats()
    }
}
