//! Immediate-EOF leaf.

use crate::error::ExecResult;
use crate::stage::{PlanStage, WorkState};
use crate::stats::{SpecificStats, StageStats};
use folio_core::{RecordId, WorkingSet};

/// Stage that produces nothing. Built when the query has no positive terms,
/// so no index scan can be materialized at all.
#[derive(Debug, Default)]
pub struct EofStage;

impl EofStage {
    /// Stage type name.
    pub const NAME: &'static str = "EOF";
}

impl PlanStage for EofStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn work(&mut self, _ws: &mut WorkingSet) -> ExecResult<WorkState> {
        Ok(WorkState::Eof)
    }

    fn is_eof(&self) -> bool {
        true
    }

    fn invalidate(&mut self, _ws: &mut WorkingSet, _id: RecordId) {}

    fn stats(&self) -> StageStats {
        StageStats::leaf(Self::NAME, SpecificStats::Eof)
    }
}
