//! Full-text query execution stages for Folio
//!
//! This crate is the execution core behind Folio's text search: a
//! pull-based tree of stages compiled from a parsed query.
//!
//! - [`IndexScanStage`]: leaf streaming one term's postings
//! - [`OrStage`]: non-scoring union with record-id dedup
//! - [`TextOrStage`]: scoring union with a multi-indexed record table and
//!   score-aware early emission
//! - [`TextAndStage`]: scoring intersection (phrase structure)
//! - [`TextNinStage`]: anti-join for negated terms
//! - [`FetchStage`] / [`TextMatchStage`]: body materialization and the
//!   final predicate re-check
//! - [`TreeBuilder`]: query → stage tree, [`PlanExecutor`]: the pull loop
//!
//! Storage is abstracted behind [`TermIndex`], [`TermCursor`] and
//! [`DocumentStore`]; [`MemoryTextIndex`] is the bundled in-memory
//! implementation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod cursor;
pub mod driver;
pub mod eof;
pub mod error;
pub mod fetch;
pub mod memory;
pub mod or_stage;
pub mod record_table;
pub mod scan;
pub mod stage;
pub mod stats;
pub mod text_and;
pub mod text_match;
pub mod text_nin;
pub mod text_or;

// Re-export commonly used types
pub use builder::{ExecContext, TreeBuilder};
pub use cursor::{DocumentStore, Posting, ScanBounds, TermCursor, TermIndex};
pub use driver::{PlanExecutor, QueryResults, TextHit};
pub use eof::EofStage;
pub use error::{BuildError, ExecError, ExecResult};
pub use fetch::FetchStage;
pub use memory::MemoryTextIndex;
pub use or_stage::OrStage;
pub use record_table::{RecordTable, ScoreCursor, TextRecordData};
pub use scan::IndexScanStage;
pub use stage::{PlanStage, WorkState};
pub use stats::{SpecificStats, StageStats};
pub use text_and::TextAndStage;
pub use text_match::TextMatchStage;
pub use text_nin::TextNinStage;
pub use text_or::TextOrStage;

// Re-export the core value types so embedders need one import path.
pub use folio_core::{
    DocumentBody, Error as CoreError, IndexKeyBlob, KeyField, ParsedTextQuery, RecordId,
    TextIndexFormat, TextIndexVersion, TextQueryBuilder, WorkingSet, WorkingSetId,
    WorkingSetMember, MAX_TERM_SCORE,
};
