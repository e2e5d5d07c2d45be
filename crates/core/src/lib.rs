//! Core types for the Folio text execution engine
//!
//! This crate defines the foundational types shared by the execution stages:
//! - RecordId: stable document identity assigned by the storage engine
//! - WorkingSet / WorkingSetMember: the pooled arena of in-flight scratch records
//! - ParsedTextQuery: the immutable value object produced by the query parser
//! - TextIndexFormat / IndexKeyBlob: the text index key layout contract
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod index_key;
pub mod query;
pub mod types;
pub mod working_set;

// Re-export commonly used types
pub use error::{Error, Result};
pub use index_key::{
    IndexKeyBlob, KeyField, TextIndexFormat, TextIndexVersion, MAX_TERM_SCORE,
};
pub use query::{ParsedTextQuery, TextQueryBuilder};
pub use types::{DocumentBody, RecordId, WorkingSetId};
pub use working_set::{WorkingSet, WorkingSetMember, DEFAULT_WORKING_SET_CAPACITY};
