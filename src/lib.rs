//! # FolioDB text execution core
//!
//! The full-text query execution engine embedded in Folio's query pipeline.
//! Given a parsed text query and a precomputed inverted index that maps
//! `(term → record id, per-term score)`, it produces a stream of matching
//! record ids, optionally annotated with an aggregate text score, emitted in
//! score-descending order when scoring is requested.
//!
//! # Quick Start
//!
//! ```
//! use foliodb::{MemoryTextIndex, PlanExecutor, TextQueryBuilder, TreeBuilder};
//! use foliodb::{ExecContext, RecordId, TextIndexFormat};
//! use std::sync::Arc;
//!
//! fn main() -> foliodb::ExecResult<()> {
//!     let mut index = MemoryTextIndex::new(TextIndexFormat::default());
//!     index.insert(RecordId(1), "rust systems programming", &[("rust", 2.0), ("systems", 1.0)]);
//!     index.insert(RecordId(2), "rust embedded database", &[("rust", 1.5), ("database", 0.9)]);
//!     index.seal();
//!
//!     let query = TextQueryBuilder::new().term("rust").term("database").build()?;
//!     let index = Arc::new(index);
//!     let ctx = ExecContext::scoring(index.clone(), index.clone());
//!
//!     let root = TreeBuilder::new(ctx).build(&query)?;
//!     let results = PlanExecutor::new(root).run()?;
//!
//!     assert_eq!(results.hits[0].record_id, RecordId(2)); // matches both terms
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! Execution is a pull-based tree of stages, each implementing
//! [`PlanStage`]. A [`TreeBuilder`] compiles a [`ParsedTextQuery`] into the
//! tree; a [`PlanExecutor`] drives the root one step at a time. The scoring
//! union ([`TextOrStage`]) keeps a multi-indexed record table and can emit a
//! result before its inputs are drained, once no unseen record can outrank
//! it.
//!
//! Internal crates (`folio-core`, `folio-text`) are re-exported here; only
//! this surface is stable.

// Re-export the public API from folio-text (which re-exports folio-core).
pub use folio_text::*;
