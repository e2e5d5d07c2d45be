//! Document fetch stage.
//!
//! Materializes the body of each record the child forwards, so the final
//! predicate re-check has text to run over. A fetch that comes back empty
//! means the record was deleted after its posting was read; the member is
//! flagged for review and skipped, never an error.

use crate::cursor::DocumentStore;
use crate::error::ExecResult;
use crate::stage::{PlanStage, WorkState};
use crate::stats::{SpecificStats, StageStats};
use folio_core::{RecordId, WorkingSet};
use std::sync::Arc;

/// Fetch stage wrapping one child.
pub struct FetchStage {
    child: Box<dyn PlanStage>,
    store: Arc<dyn DocumentStore>,
    docs_fetched: u64,
    docs_invalidated: u64,
}

impl FetchStage {
    /// Stage type name.
    pub const NAME: &'static str = "FETCH";

    /// Fetch bodies for `child`'s output from `store`.
    pub fn new(child: Box<dyn PlanStage>, store: Arc<dyn DocumentStore>) -> Self {
        FetchStage {
            child,
            store,
            docs_fetched: 0,
            docs_invalidated: 0,
        }
    }
}

impl PlanStage for FetchStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn work(&mut self, ws: &mut WorkingSet) -> ExecResult<WorkState> {
        match self.child.work(ws)? {
            WorkState::Advanced(id) => {
                if ws.is_flagged(id) {
                    return Ok(WorkState::NeedTime);
                }
                let Some(record_id) = ws.get(id).and_then(|m| m.record_id) else {
                    ws.flag_for_review(id);
                    return Ok(WorkState::NeedTime);
                };
                match self.store.fetch(record_id) {
                    Some(body) => {
                        ws.get_mut(id).expect("member is live").body = Some(body);
                        self.docs_fetched += 1;
                        Ok(WorkState::Advanced(id))
                    }
                    None => {
                        self.docs_invalidated += 1;
                        ws.flag_for_review(id);
                        Ok(WorkState::NeedTime)
                    }
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
            specific: SpecificStats::Fetch {
                docs_fetched: self.docs_fetched,
                docs_invalidated: self.docs_invalidated,
            },
            children: vec![self.child.stats()],
        }
    }
}
