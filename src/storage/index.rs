//! Expiry Index
//!
//! A min-heap of `(expires_at, key)` pairs used to find the next record to
//! expire without scanning the whole map.
//!
//! The index is append-only from the writer's point of view: every `set`
//! pushes a candidate, and nothing is removed when a key is deleted or
//! overwritten. Candidates that no longer describe a live record are
//! tombstones; the engine discards them when it pops them.
//!
//! ```text
//!   push(k=b, t=5)   push(k=a, t=5)   push(k=c, t=2)
//!
//!              (2, c)          <- popped first
//!             /      \
//!        (5, a)     (5, b)     <- equal deadlines: lower key first
//! ```

use crate::clock::Timestamp;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// A reference to a record that may be due for eviction.
///
/// The key is an owned copy. A candidate routinely outlives the record it
/// was created for, so it must never point into the map.
///
/// Field order matters: the derived `Ord` compares `expires_at` first and
/// breaks ties on `key`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExpiryCandidate {
    pub expires_at: Timestamp,
    pub key: String,
}

impl ExpiryCandidate {
    pub fn new(key: String, expires_at: Timestamp) -> Self {
        Self { expires_at, key }
    }

    /// Returns `true` if this candidate's deadline has been reached.
    #[inline]
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}

/// Min-ordered collection of [`ExpiryCandidate`]s.
#[derive(Debug, Default)]
pub struct ExpiryIndex {
    heap: BinaryHeap<Reverse<ExpiryCandidate>>,
}

impl ExpiryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a candidate. O(log n).
    pub fn push(&mut self, candidate: ExpiryCandidate) {
        self.heap.push(Reverse(candidate));
    }

    /// Returns the candidate with the earliest deadline, if any.
    pub fn peek(&self) -> Option<&ExpiryCandidate> {
        self.heap.peek().map(|Reverse(candidate)| candidate)
    }

    /// Removes and returns the earliest candidate, but only if it is due at
    /// `now`. A candidate that is not yet due stays in the index.
    pub fn pop_due(&mut self, now: Timestamp) -> Option<ExpiryCandidate> {
        if !self.peek()?.is_due(now) {
            return None;
        }
        self.heap.pop().map(|Reverse(candidate)| candidate)
    }

    /// Number of candidates, tombstones included.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
