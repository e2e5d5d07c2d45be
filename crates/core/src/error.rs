//! Error types for the Folio text core
//!
//! We use `thiserror` for automatic `Display` and `Error` trait
//! implementations. Errors are structured: each variant carries typed fields
//! so callers can react without parsing messages.
//!
//! Execution-layer errors (storage failures surfaced through a term cursor,
//! tree construction errors) live in `folio-text`; this enum covers the
//! shared value types and the working-set arena.

use serde::{Deserialize, Serialize};

/// Errors raised by the core value types and the working-set arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum Error {
    /// The working-set arena refused a new member.
    ///
    /// Fatal for the query: the offending stage reports it and the driver
    /// tears the tree down. There is no retry at this layer.
    #[error("working set exhausted: capacity {capacity} reached")]
    WorkingSetExhausted {
        /// Configured member capacity of the arena.
        capacity: usize,
    },

    /// A parsed-query invariant was violated at construction.
    #[error("invalid text query: {reason}")]
    InvalidQuery {
        /// Which invariant failed.
        reason: String,
    },

    /// An index key blob did not match the declared format.
    #[error("malformed index key: {reason}")]
    MalformedIndexKey {
        /// What the decoder found instead.
        reason: String,
    },
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
