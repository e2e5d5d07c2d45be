//! Per-stage execution counters.
//!
//! Read-only observability: every stage tracks a small set of counters and
//! exposes them as a tree mirroring the stage tree, aggregated by the
//! driver on query completion. There is no tracing in the hot loop; these
//! counters are the observability channel.

use serde::{Deserialize, Serialize};

/// Counter snapshot for one stage, with children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStats {
    /// Stage type name (`TEXT_OR`, `INDEX_SCAN`, ...).
    pub stage: String,
    /// Stage-specific counters.
    pub specific: SpecificStats,
    /// Stats of the stage's children, in child order.
    pub children: Vec<StageStats>,
}

impl StageStats {
    /// Leaf node constructor.
    pub fn leaf(stage: &str, specific: SpecificStats) -> Self {
        StageStats {
            stage: stage.to_string(),
            specific,
            children: Vec::new(),
        }
    }

    /// Total number of stages in this subtree (self included).
    pub fn tree_size(&self) -> usize {
        1 + self.children.iter().map(StageStats::tree_size).sum::<usize>()
    }
}

/// Stage-specific counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SpecificStats {
    /// Index scan leaf.
    IndexScan {
        /// Postings pulled from the cursor.
        keys_examined: u64,
    },

    /// Non-scoring union.
    Or {
        /// Record ids checked against the seen set.
        dups_tested: u64,
        /// Duplicates dropped (members freed).
        dups_dropped: u64,
        /// Seen-set entries forgotten through invalidation.
        record_ids_forgotten: u64,
    },

    /// Scoring union.
    TextOr {
        /// Whether an aggregate text score is computed.
        want_text_score: bool,
        /// Whether the single-child fast path was taken.
        single_child: bool,
        /// Record ids checked against the table.
        dups_tested: u64,
        /// Repeat observations folded into existing table entries.
        dups_dropped: u64,
        /// Table entries dropped through invalidation.
        record_ids_forgotten: u64,
        /// Advances produced per child.
        per_child_advances: Vec<u64>,
    },

    /// Scoring intersection.
    TextAnd {
        /// Whether an aggregate text score is computed.
        want_text_score: bool,
        /// Whether the single-child fast path was taken.
        single_child: bool,
        /// Record ids checked against the table.
        dups_tested: u64,
        /// Intersection misses and repeats dropped (members freed).
        dups_dropped: u64,
        /// Table entries dropped through invalidation.
        record_ids_forgotten: u64,
        /// Advances produced per child.
        per_child_advances: Vec<u64>,
    },

    /// Anti-join.
    TextNin {
        /// Record ids checked against the exclusion set.
        dups_tested: u64,
        /// Duplicate exclusion entries dropped.
        dups_dropped: u64,
        /// Inner records rejected by the exclusion set.
        docs_rejected: u64,
        /// Exclusion entries forgotten through invalidation.
        record_ids_forgotten: u64,
        /// Advances produced per child (feeders first, inner last).
        per_child_advances: Vec<u64>,
    },

    /// Document fetch.
    Fetch {
        /// Bodies materialized.
        docs_fetched: u64,
        /// Fetches that found the record gone (member flagged).
        docs_invalidated: u64,
    },

    /// Final predicate re-check.
    TextMatch {
        /// Documents failing the predicate (members freed).
        docs_rejected: u64,
    },

    /// Immediate-EOF leaf.
    Eof,
}
