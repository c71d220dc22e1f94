//! Per-origin append-only note logs
//!
//! Every note ever published is partitioned by the identity of the node that
//! first published it. Each origin owns an ordered, append-only sequence of
//! notes indexed by a zero-based sequence number.
//!
//! Invariants:
//! - sequence numbers for an origin are contiguous starting at 0
//! - a filled position is never rewritten
//!
//! Both hold structurally here: notes live in a `Vec` and the only mutation
//! is a push at the tail.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::OriginId;

/// Mapping of origin identity to its complete ordered note sequence
///
/// Iteration order is deterministic (sorted by origin id), which keeps
/// snapshots and initial status announcements reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogStore {
    origins: BTreeMap<OriginId, Vec<String>>,
}

impl LogStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure an origin is tracked, creating an empty log if needed
    pub fn ensure_origin(&mut self, origin: OriginId) {
        self.origins.entry(origin).or_default();
    }

    /// Whether the origin is tracked at all (an empty log counts)
    pub fn contains(&self, origin: OriginId) -> bool {
        self.origins.contains_key(&origin)
    }

    /// Number of notes held for an origin (0 if the origin is unknown)
    pub fn len_of(&self, origin: OriginId) -> u64 {
        self.origins.get(&origin).map_or(0, |log| log.len() as u64)
    }

    /// Highest sequence number held for an origin, or None for an empty log
    pub fn last_seqno(&self, origin: OriginId) -> Option<u64> {
        self.len_of(origin).checked_sub(1)
    }

    /// Get the note at a position, if it is held
    pub fn get(&self, origin: OriginId, seqno: u64) -> Option<&str> {
        self.origins
            .get(&origin)?
            .get(seqno as usize)
            .map(String::as_str)
    }

    /// Append a note to an origin's log, returning its sequence number
    ///
    /// The note always lands at the current tail, so the contiguity
    /// invariant cannot be broken here. Callers decide whether an incoming
    /// (seqno, note) pair belongs at the tail.
    pub fn append(&mut self, origin: OriginId, note: String) -> u64 {
        let log = self.origins.entry(origin).or_default();
        log.push(note);
        (log.len() - 1) as u64
    }

    /// Iterate over all origins and their logs, in sorted origin order
    pub fn iter(&self) -> impl Iterator<Item = (&OriginId, &Vec<String>)> {
        self.origins.iter()
    }

    /// Number of distinct origins tracked
    pub fn origin_count(&self) -> usize {
        self.origins.len()
    }

    /// Total number of notes across all origins
    pub fn note_count(&self) -> usize {
        self.origins.values().map(Vec::len).sum()
    }
}
