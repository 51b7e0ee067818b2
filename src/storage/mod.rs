//! Storage Engine Module
//!
//! This module provides the core storage functionality for ttlkv: a
//! single-owner key-value store with TTL support, the expiry index that
//! drives eviction, and an optional background sweeper.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        KvStorage                            │
//! │  ┌──────────────────────┐      ┌──────────────────────┐     │
//! │  │     Primary Map      │◀─────│     Expiry Index     │     │
//! │  │  key -> Record       │      │  (expires_at, key)   │     │
//! │  └──────────────────────┘      └──────────────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ Arc<Mutex<_>>
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Lazy Expiry**: Expired records are hidden from reads immediately
//! - **Incremental Eviction**: One expired record reclaimed per call
//! - **Sorted Reads**: Range scans in byte-lexicographic key order
//! - **Injected Clock**: Deterministic tests with [`ManualClock`](crate::clock::ManualClock)
//!
//! ## Example
//!
//! ```
//! use ttlkv::storage::KvStorage;
//! use bytes::Bytes;
//!
//! let mut store = KvStorage::default();
//!
//! // Basic operations
//! store.set("name", "Ariz", 0);
//! assert_eq!(store.get("name"), Some(Bytes::from("Ariz")));
//!
//! // Set with TTL
//! store.set("session", "token123", 3600);
//!
//! // Range read
//! let page = store.get_many_sorted("n", 10);
//! assert_eq!(page.len(), 2);
//! ```

pub mod engine;
pub mod expiry;
pub mod index;

use std::sync::{Arc, Mutex};

// Re-export commonly used types
pub use engine::{KvStorage, Record, StorageStats};
pub use expiry::{start_expiry_sweeper, ConfigError, ExpirySweeper, SweeperConfig};
pub use index::{ExpiryCandidate, ExpiryIndex};

/// A store shared between tasks. The engine has no locking of its own.
pub type SharedStorage<C> = Arc<Mutex<KvStorage<C>>>;

/// Wraps a store for sharing with an [`ExpirySweeper`].
pub fn shared<C>(store: KvStorage<C>) -> SharedStorage<C> {
    Arc::new(Mutex::new(store))
}
