//! The stage capability contract.
//!
//! Execution is a pull-based tree: every node implements [`PlanStage`] and
//! is driven one step at a time through [`PlanStage::work`]. A step either
//! hands a working-set id to the caller, reports that it made internal
//! progress and wants to be called again, asks the driver to release
//! resources first, or declares the stream finished. Fatal failures travel
//! on the `Err` channel and carry their own diagnostics.
//!
//! A stage owns its children; dropping the root releases children and their
//! cursors in reverse construction order.

use crate::error::ExecResult;
use crate::stats::StageStats;
use folio_core::{RecordId, WorkingSet, WorkingSetId};

/// Outcome of one `work` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkState {
    /// A working-set id is ready for the caller.
    Advanced(WorkingSetId),

    /// Progress was made internally; call again.
    NeedTime,

    /// The stage asks the driver to release resources (e.g. refresh a
    /// storage snapshot) before the next call. Drivers with nothing to
    /// release treat this exactly like [`NeedTime`](WorkState::NeedTime).
    NeedYield(WorkingSetId),

    /// No more output. Every subsequent call returns `Eof` again.
    Eof,
}

/// One node of the execution tree.
pub trait PlanStage {
    /// Stage type name, for stats and diagnostics.
    fn name(&self) -> &'static str;

    /// Advance one step.
    fn work(&mut self, ws: &mut WorkingSet) -> ExecResult<WorkState>;

    /// Whether the stage has reached its terminal state.
    fn is_eof(&self) -> bool;

    /// Storage-layer notification that `id` was physically deleted.
    ///
    /// Recurses into children, drops any buffered entry for `id` and flags
    /// the associated working-set member for review. Never an error, never
    /// a state transition; invalidating an unknown id is a no-op and doing
    /// it twice is the same as once. A later posting carrying the same id
    /// is treated as a fresh record.
    fn invalidate(&mut self, ws: &mut WorkingSet, id: RecordId);

    /// Snapshot of this stage's counters, children included.
    fn stats(&self) -> StageStats;
}

impl std::fmt::Debug for dyn PlanStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
