//! Pooled arena of in-flight scratch records
//!
//! Every document flowing through the execution tree is represented by a
//! [`WorkingSetMember`] owned by this arena and referenced by integer
//! [`WorkingSetId`]. Stages allocate members when a posting surfaces, hand
//! the ids upward, and free members they decide not to forward (duplicates,
//! intersection misses, excluded records). Freed slots are recycled through
//! a free list.
//!
//! A member whose record id has been invalidated mid-query is *flagged for
//! review* rather than freed: downstream stages skip flagged members, and
//! the query layer above decides what to do with them at completion.

use crate::error::{Error, Result};
use crate::index_key::IndexKeyBlob;
use crate::types::{DocumentBody, RecordId, WorkingSetId};
use rustc_hash::FxHashSet;

/// Default member capacity of a working set.
///
/// Generous: the table-building stages hold one member per distinct record
/// id across all children, and posting lists routinely reach tens of
/// thousands of entries.
pub const DEFAULT_WORKING_SET_CAPACITY: usize = 1 << 20;

// ============================================================================
// WorkingSetMember
// ============================================================================

/// Scratch record for one document in flight.
#[derive(Debug, Clone, Default)]
pub struct WorkingSetMember {
    /// Stable document identity, set by the index scan that produced this
    /// member. Always present on members emitted by a scan.
    pub record_id: Option<RecordId>,

    /// The raw index key the posting was read from. The scoring stages
    /// re-extract the per-term score from this blob.
    pub key_blob: Option<IndexKeyBlob>,

    /// Fetched document body, populated by the fetch path.
    pub body: Option<DocumentBody>,

    /// Computed side-channel: the aggregate text score attached by a
    /// scoring stage.
    pub computed_score: Option<f64>,
}

impl WorkingSetMember {
    /// Whether a record id is present (invalidation can strip it).
    pub fn has_record_id(&self) -> bool {
        self.record_id.is_some()
    }

    /// Attach or overwrite the computed text score.
    pub fn set_computed_score(&mut self, score: f64) {
        self.computed_score = Some(score);
    }
}

// ============================================================================
// WorkingSet
// ============================================================================

/// The arena. One per query, shared by every stage in the tree, accessed
/// single-threadedly.
#[derive(Debug)]
pub struct WorkingSet {
    slots: Vec<Option<WorkingSetMember>>,
    free: Vec<u32>,
    flagged: FxHashSet<WorkingSetId>,
    capacity: usize,
}

impl Default for WorkingSet {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkingSet {
    /// Create an arena with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_WORKING_SET_CAPACITY)
    }

    /// Create an arena bounded to `capacity` live members.
    pub fn with_capacity(capacity: usize) -> Self {
        WorkingSet {
            slots: Vec::new(),
            free: Vec::new(),
            flagged: FxHashSet::default(),
            capacity,
        }
    }

    /// Allocate a fresh (default) member.
    ///
    /// Returns [`Error::WorkingSetExhausted`] when the arena is at capacity;
    /// the query aborts in that case.
    pub fn allocate(&mut self) -> Result<WorkingSetId> {
        if let Some(slot) = self.free.pop() {
            self.slots[slot as usize] = Some(WorkingSetMember::default());
            return Ok(WorkingSetId(slot));
        }
        if self.slots.len() >= self.capacity {
            return Err(Error::WorkingSetExhausted {
                capacity: self.capacity,
            });
        }
        let id = WorkingSetId(self.slots.len() as u32);
        self.slots.push(Some(WorkingSetMember::default()));
        Ok(id)
    }

    /// Borrow a member. `None` for freed slots and invalid ids.
    pub fn get(&self, id: WorkingSetId) -> Option<&WorkingSetMember> {
        self.slots.get(id.0 as usize)?.as_ref()
    }

    /// Mutably borrow a member.
    pub fn get_mut(&mut self, id: WorkingSetId) -> Option<&mut WorkingSetMember> {
        self.slots.get_mut(id.0 as usize)?.as_mut()
    }

    /// Release a member back to the arena. Freeing an already-free or
    /// invalid id is a no-op.
    pub fn free(&mut self, id: WorkingSetId) {
        let Some(slot) = self.slots.get_mut(id.0 as usize) else {
            return;
        };
        if slot.take().is_some() {
            self.free.push(id.0);
            self.flagged.remove(&id);
        }
    }

    /// Mark a member as needing review: its record id was invalidated while
    /// the member was buffered inside a stage. The member stays allocated
    /// but downstream stages skip it.
    pub fn flag_for_review(&mut self, id: WorkingSetId) {
        if let Some(member) = self.get_mut(id) {
            member.record_id = None;
            self.flagged.insert(id);
        }
    }

    /// Whether a member has been flagged for review.
    pub fn is_flagged(&self, id: WorkingSetId) -> bool {
        self.flagged.contains(&id)
    }

    /// Number of live (allocated, unfreed) members.
    pub fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Number of members currently flagged for review.
    pub fn flagged_count(&self) -> usize {
        self.flagged.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
