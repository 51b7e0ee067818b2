//! Storage Engine with Lazy Expiry and Incremental Eviction
//!
//! This module implements the core storage engine for ttlkv: a key-value map
//! whose records may carry a time-to-live.
//!
//! ## Design Decisions
//!
//! 1. **Primary Map**: A `HashMap<String, Record>` is the only source of truth
//!    for whether a key is alive and what its value is.
//! 2. **Expiry Index**: A min-heap of `(expires_at, key)` candidates, pushed on
//!    every write and never cleaned eagerly. See [`ExpiryIndex`].
//! 3. **Lazy Expiry**: Reads filter out records whose deadline has passed but
//!    never mutate the map.
//! 4. **Incremental Eviction**: [`KvStorage::remove_one_expired_entry`]
//!    reclaims at most one record per call, discarding tombstones on the way.
//! 5. **Injected Clock**: Every notion of "now" comes from the [`Clock`] the
//!    store was built with.
//!
//! ## Layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          KvStorage                            │
//! │                                                               │
//! │  ┌─────────────────────────┐       ┌───────────────────────┐  │
//! │  │       Primary Map       │       │     Expiry Index      │  │
//! │  │  key -> (value, expiry) │◀──────│ min-heap (expiry, key)│  │
//! │  │     (authoritative)     │ check │    (may be stale)     │  │
//! │  └─────────────────────────┘       └───────────────────────┘  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency Model
//!
//! None. Mutating operations take `&mut self`; callers that share a store
//! across threads wrap it in a lock (see [`SharedStorage`](super::SharedStorage)).

use crate::clock::{Clock, SystemClock, Timestamp};
use crate::storage::index::{ExpiryCandidate, ExpiryIndex};
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, trace};

/// A stored value and its deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The actual value stored
    pub value: Bytes,
    /// When this record expires ([`Timestamp::NEVER`] = never expires)
    pub expires_at: Timestamp,
}

impl Record {
    /// Creates a record that expires `ttl_secs` seconds after `now`.
    /// A TTL of zero means the record never expires.
    pub fn new(value: Bytes, ttl_secs: u32, now: Timestamp) -> Self {
        let expires_at = if ttl_secs == 0 {
            Timestamp::NEVER
        } else {
            now + Duration::from_secs(u64::from(ttl_secs))
        };
        Self { value, expires_at }
    }

    /// Checks if this record has expired at `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        !self.expires_at.is_never() && now >= self.expires_at
    }
}

/// How an expiry candidate relates to the current contents of the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reconciliation {
    /// The key is gone; the candidate outlived a `remove` or an eviction.
    Absent,
    /// The key was overwritten with a different deadline.
    Superseded,
    /// The candidate describes the live record.
    Current,
}

/// Counters describing the work done by a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Records physically held, including expired ones not yet evicted
    pub keys: usize,
    /// Candidates in the expiry index, tombstones included
    pub pending_expirations: usize,
    /// Total `set` calls
    pub sets: u64,
    /// `remove` calls that deleted a record
    pub removes: u64,
    /// Records reclaimed by eviction
    pub evictions: u64,
    /// Stale index candidates thrown away during eviction
    pub tombstones_discarded: u64,
}

/// The ttlkv storage engine.
///
/// # Example
///
/// ```
/// use ttlkv::clock::ManualClock;
/// use ttlkv::storage::KvStorage;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let mut store = KvStorage::new(clock.clone());
///
/// store.set("name", "Ariz", 0);
/// store.set("session", "abc123", 60);
/// assert_eq!(store.get("session"), Some(Bytes::from("abc123")));
///
/// clock.advance(Duration::from_secs(60));
/// assert_eq!(store.get("session"), None);
/// assert_eq!(
///     store.remove_one_expired_entry(),
///     Some(("session".to_string(), Bytes::from("abc123")))
/// );
/// assert_eq!(store.get("name"), Some(Bytes::from("Ariz")));
/// ```
#[derive(Debug)]
pub struct KvStorage<C = SystemClock> {
    clock: C,
    map: HashMap<String, Record>,
    expiry_index: ExpiryIndex,
    stats: Counters,
}

#[derive(Debug, Default)]
struct Counters {
    sets: u64,
    removes: u64,
    evictions: u64,
    tombstones_discarded: u64,
}

impl Default for KvStorage<SystemClock> {
    fn default() -> Self {
        Self::new(SystemClock::new())
    }
}

impl<C: Clock> KvStorage<C> {
    /// Creates an empty store reading time from `clock`.
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            map: HashMap::new(),
            expiry_index: ExpiryIndex::new(),
            stats: Counters::default(),
        }
    }

    /// Creates a store and loads `entries` through [`set`](Self::set), in
    /// order. Later entries for the same key overwrite earlier ones.
    pub fn with_entries<I, K, V>(entries: I, clock: C) -> Self
    where
        I: IntoIterator<Item = (K, V, u32)>,
        K: Into<String>,
        V: Into<Bytes>,
    {
        let mut store = Self::new(clock);
        for (key, value, ttl) in entries {
            store.set(key, value, ttl);
        }
        debug!(
            keys = store.map.len(),
            candidates = store.expiry_index.len(),
            "Storage initialized from entries"
        );
        store
    }

    /// Returns the clock this store reads time from.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Sets `key` to `value`, expiring `ttl` seconds from now.
    ///
    /// A `ttl` of zero means the record never expires. Any existing record is
    /// replaced unconditionally, deadline included.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Bytes>, ttl: u32) {
        let key = key.into();
        let record = Record::new(value.into(), ttl, self.clock.now());

        self.expiry_index
            .push(ExpiryCandidate::new(key.clone(), record.expires_at));
        self.map.insert(key, record);
        self.stats.sets += 1;
    }

    /// Deletes a key.
    ///
    /// Returns `true` if a record was deleted. Any expiry candidate for the
    /// key is left behind and discarded later by eviction.
    pub fn remove(&mut self, key: &str) -> bool {
        if self.map.remove(key).is_some() {
            self.stats.removes += 1;
            true
        } else {
            false
        }
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An expired
    /// record is only hidden; it stays in memory until evicted.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let now = self.clock.now();
        self.map
            .get(key)
            .filter(|record| !record.is_expired_at(now))
            .map(|record| record.value.clone())
    }

    /// Checks whether a live, unexpired record exists for `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.map
            .get(key)
            .is_some_and(|record| !record.is_expired_at(now))
    }

    /// Returns the time left before `key` expires.
    ///
    /// `None` if the key is absent or expired, `Some(None)` if it never
    /// expires.
    pub fn ttl(&self, key: &str) -> Option<Option<Duration>> {
        let now = self.clock.now();
        self.map
            .get(key)
            .filter(|record| !record.is_expired_at(now))
            .map(|record| {
                if record.expires_at.is_never() {
                    None
                } else {
                    Some(record.expires_at.saturating_duration_since(now))
                }
            })
    }

    /// Drops every record along with the whole expiry index.
    ///
    /// Counters are kept.
    pub fn clear(&mut self) {
        self.map.clear();
        self.expiry_index.clear();
        debug!("Storage cleared");
    }

    /// Returns up to `count` live pairs whose keys are `>= start`, in
    /// ascending key order.
    ///
    /// Every call collects and sorts the full set of live keys, O(n log n).
    pub fn get_many_sorted(&self, start: &str, count: usize) -> Vec<(String, Bytes)> {
        let now = self.clock.now();

        let mut keys: Vec<&String> = self
            .map
            .iter()
            .filter(|(_, record)| !record.is_expired_at(now))
            .map(|(key, _)| key)
            .collect();
        keys.sort_unstable();

        let first = keys.partition_point(|key| key.as_str() < start);

        keys[first..]
            .iter()
            .take(count)
            .filter_map(|key| {
                self.map
                    .get(key.as_str())
                    .map(|record| ((*key).clone(), record.value.clone()))
            })
            .collect()
    }

    /// Evicts at most one expired record and returns it.
    ///
    /// Candidates are taken from the expiry index in `(expires_at, key)`
    /// order. Tombstones are discarded until a candidate matches a live
    /// record, which is then removed from the map. Returns `None` once the
    /// earliest remaining candidate is not yet due, or the index is empty;
    /// in that case the map is left untouched.
    pub fn remove_one_expired_entry(&mut self) -> Option<(String, Bytes)> {
        let now = self.clock.now();

        while let Some(candidate) = self.expiry_index.pop_due(now) {
            match self.reconcile(&candidate) {
                Reconciliation::Absent | Reconciliation::Superseded => {
                    self.stats.tombstones_discarded += 1;
                    trace!(
                        key = %candidate.key,
                        expires_at = %candidate.expires_at,
                        "Discarded stale expiry candidate"
                    );
                }
                Reconciliation::Current => {
                    if let Some(record) = self.map.remove(&candidate.key) {
                        self.stats.evictions += 1;
                        trace!(
                            key = %candidate.key,
                            expires_at = %candidate.expires_at,
                            "Evicted expired record"
                        );
                        return Some((candidate.key, record.value));
                    }
                }
            }
        }

        None
    }

    /// Evicts expired records until none are due or `limit` were reclaimed.
    ///
    /// Returns the number of records reclaimed.
    pub fn remove_expired(&mut self, limit: usize) -> usize {
        let mut removed = 0;
        while removed < limit && self.remove_one_expired_entry().is_some() {
            removed += 1;
        }
        if removed > 0 {
            debug!(removed, remaining = self.map.len(), "Removed expired records");
        }
        removed
    }

    fn reconcile(&self, candidate: &ExpiryCandidate) -> Reconciliation {
        match self.map.get(&candidate.key) {
            None => Reconciliation::Absent,
            Some(record) if record.expires_at != candidate.expires_at => {
                Reconciliation::Superseded
            }
            Some(_) => Reconciliation::Current,
        }
    }

    /// Returns the number of records held, including expired records that
    /// have not been evicted yet.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the number of candidates in the expiry index, tombstones
    /// included.
    pub fn pending_expirations(&self) -> usize {
        self.expiry_index.len()
    }

    /// Returns a snapshot of the store's counters.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.map.len(),
            pending_expirations: self.expiry_index.len(),
            sets: self.stats.sets,
            removes: self.stats.removes,
            evictions: self.stats.evictions,
            tombstones_discarded: self.stats.tombstones_discarded,
        }
    }
}
