//! Index scan leaf.
//!
//! Wraps one term's posting cursor. Every advance pulls one posting,
//! allocates a working-set member carrying the record id and the raw index
//! key, and hands the member up. The cursor is opened lazily on the first
//! advance; a term with no postings makes the scan immediately EOF.

use crate::cursor::{ScanBounds, TermCursor, TermIndex};
use crate::error::ExecResult;
use crate::stage::{PlanStage, WorkState};
use crate::stats::{SpecificStats, StageStats};
use folio_core::{RecordId, TextIndexFormat, WorkingSet};
use std::sync::Arc;

/// Leaf stage streaming one term's postings into working-set members.
pub struct IndexScanStage {
    index: Arc<dyn TermIndex>,
    bounds: ScanBounds,
    format: TextIndexFormat,
    cursor: Option<Box<dyn TermCursor>>,
    opened: bool,
    eof: bool,
    keys_examined: u64,
}

impl IndexScanStage {
    /// Stage type name.
    pub const NAME: &'static str = "INDEX_SCAN";

    /// Scan `bounds` against `index`.
    pub fn new(index: Arc<dyn TermIndex>, bounds: ScanBounds, format: TextIndexFormat) -> Self {
        IndexScanStage {
            index,
            bounds,
            format,
            cursor: None,
            opened: false,
            eof: false,
            keys_examined: 0,
        }
    }

    /// The term this scan covers.
    pub fn term(&self) -> &str {
        &self.bounds.term
    }
}

impl PlanStage for IndexScanStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn work(&mut self, ws: &mut WorkingSet) -> ExecResult<WorkState> {
        if self.eof {
            return Ok(WorkState::Eof);
        }
        if !self.opened {
            self.opened = true;
            self.cursor = self.index.open_term_cursor(&self.bounds, &self.format)?;
            if self.cursor.is_none() {
                self.eof = true;
                return Ok(WorkState::Eof);
            }
        }

        let cursor = self.cursor.as_mut().expect("cursor open");
        match cursor.next()? {
            Some(posting) => {
                self.keys_examined += 1;
                let id = ws.allocate()?;
                let member = ws.get_mut(id).expect("freshly allocated member");
                member.record_id = Some(posting.record_id);
                member.key_blob = Some(posting.key);
                Ok(WorkState::Advanced(id))
            }
            None => {
                self.eof = true;
                self.cursor = None;
                Ok(WorkState::Eof)
            }
        }
    }

    fn is_eof(&self) -> bool {
        self.eof
    }

    fn invalidate(&mut self, _ws: &mut WorkingSet, _id: RecordId) {
        // Nothing buffered: members are handed upward as soon as they are
        // produced.
    }

    fn stats(&self) -> StageStats {
        StageStats::leaf(
            Self::NAME,
            SpecificStats::IndexScan {
                keys_examined: self.keys_examined,
            },
        )
    }
}
