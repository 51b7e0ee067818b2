//! # ttlkv - An Embeddable Key-Value Store with TTL Expiry
//!
//! ttlkv is an in-process key-value store meant to sit inside a larger
//! program, such as a cache layer or a session store. Records may carry a
//! time-to-live, can be read back in sorted key order, and are reclaimed
//! incrementally once they expire.
//!
//! There is no network interface, no persistence and no internal locking.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               ttlkv                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │   Clock     │───>│                 KvStorage                    │   │
//! │  │ (injected)  │    │  ┌─────────────────┐   ┌──────────────────┐  │   │
//! │  └─────────────┘    │  │   Primary Map   │◀──│   Expiry Index   │  │   │
//! │                     │  │ (authoritative) │   │ (may hold stale) │  │   │
//! │                     │  └─────────────────┘   └──────────────────┘  │   │
//! │                     └──────────────────────────────────────────────┘   │
//! │                                               ▲                         │
//! │                                               │ optional                │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpirySweeper                         │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use ttlkv::clock::ManualClock;
//! use ttlkv::storage::KvStorage;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let clock = ManualClock::new();
//! let mut store = KvStorage::with_entries(
//!     vec![("a", "1", 0), ("b", "2", 0), ("c", "3", 0)],
//!     clock.clone(),
//! );
//!
//! assert_eq!(
//!     store.get_many_sorted("b", 2),
//!     vec![
//!         ("b".to_string(), Bytes::from("2")),
//!         ("c".to_string(), Bytes::from("3")),
//!     ]
//! );
//!
//! store.set("k", "v", 1);
//! clock.advance(Duration::from_secs(1));
//! assert_eq!(store.get("k"), None);
//! assert_eq!(
//!     store.remove_one_expired_entry(),
//!     Some(("k".to_string(), Bytes::from("v")))
//! );
//! assert_eq!(store.remove_one_expired_entry(), None);
//! ```
//!
//! ## Operations
//!
//! - `set key value ttl` - Write a record; a TTL of 0 never expires
//! - `get key` - Read a live record
//! - `remove key` - Delete a record
//! - `get_many_sorted start count` - Read live records with keys `>= start`
//! - `remove_one_expired_entry` - Reclaim one expired record
//!
//! ## Module Overview
//!
//! - [`clock`]: Time sources the store reads "now" from
//! - [`storage`]: The storage engine, its expiry index and the sweeper
//!
//! ## Design Highlights
//!
//! ### Lazy Expiry + Incremental Eviction
//!
//! Expired records disappear from reads at once, but stay in memory until
//! [`KvStorage::remove_one_expired_entry`] reclaims them. Eviction walks a
//! min-heap of `(expires_at, key)` candidates and throws away candidates
//! left behind by removals and overwrites as it meets them.
//!
//! ### Deterministic Time
//!
//! The store never calls the system clock itself, so tests drive expiry
//! with a [`ManualClock`](clock::ManualClock) instead of sleeping.

pub mod clock;
pub mod storage;

// Re-export commonly used types for convenience
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use storage::{
    shared, start_expiry_sweeper, ConfigError, ExpirySweeper, KvStorage, SharedStorage,
    StorageStats, SweeperConfig,
};

/// Version of ttlkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
