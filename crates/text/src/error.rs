//! Error types for the execution stages.
//!
//! Three layers, matching the failure taxonomy of the executor:
//! storage failures surfaced through term cursors, resource failures from
//! the working-set arena (wrapped core errors), and construction failures
//! from the tree builder. Composition stages never retry: a child's error
//! propagates unchanged through `?` and the driver tears the tree down.

use serde::{Deserialize, Serialize};

/// Tree construction errors. Fatal before any data flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum BuildError {
    /// A composition stage was handed an empty child list.
    #[error("{stage} stage requires at least one child")]
    NoChildren {
        /// Stage type name.
        stage: String,
    },

    /// The query was parsed against a different index layout version than
    /// the index the tree is being built over.
    #[error("index version mismatch: query parsed for {query}, index is {index}")]
    IndexVersionMismatch {
        /// Version the query was parsed against.
        query: String,
        /// Version of the target index.
        index: String,
    },
}

/// Runtime execution errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum ExecError {
    /// Storage error surfaced through a term cursor. No retry at this
    /// layer; the diagnostic travels with the error.
    #[error("storage error on term {term:?}: {message}")]
    Storage {
        /// Term whose cursor failed.
        term: String,
        /// Diagnostic from the storage layer.
        message: String,
    },

    /// Working-set exhaustion or another core-layer failure.
    #[error(transparent)]
    Core(#[from] folio_core::Error),

    /// Tree construction failure.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// The driver observed the interrupt flag between steps.
    #[error("query interrupted")]
    Interrupted,
}

/// Result alias for execution operations.
pub type ExecResult<T> = std::result::Result<T, ExecError>;
