//! Time Sources
//!
//! The storage engine never reads the wall clock directly. Instead it is
//! handed a [`Clock`] at construction and asks it for the current
//! [`Timestamp`] whenever an operation needs to know what "now" is.
//!
//! Two clocks ship with the crate:
//!
//! - [`SystemClock`]: monotonic time backed by [`std::time::Instant`]
//! - [`ManualClock`]: a shared, manually advanced clock for tests and
//!   simulations
//!
//! ## Example
//!
//! ```
//! use ttlkv::clock::{Clock, ManualClock};
//! use std::time::Duration;
//!
//! let clock = ManualClock::new();
//! let handle = clock.clone();
//!
//! let before = clock.now();
//! handle.advance(Duration::from_secs(5));
//! assert_eq!(clock.now(), before + Duration::from_secs(5));
//! ```

use std::fmt;
use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A point in time, measured as an offset from the owning clock's origin.
///
/// Timestamps from different clocks are not comparable in any meaningful
/// way, but the type does not try to prevent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(Duration);

impl Timestamp {
    /// The clock's origin.
    pub const ZERO: Timestamp = Timestamp(Duration::ZERO);

    /// Sentinel used for records that never expire. Orders after every
    /// reachable timestamp.
    pub const NEVER: Timestamp = Timestamp(Duration::MAX);

    /// Creates a timestamp `offset` after the clock's origin.
    pub const fn from_offset(offset: Duration) -> Self {
        Self(offset)
    }

    /// Returns the offset from the clock's origin.
    pub const fn offset(&self) -> Duration {
        self.0
    }

    /// Returns `true` if this is the [`Timestamp::NEVER`] sentinel.
    #[inline]
    pub fn is_never(&self) -> bool {
        *self == Self::NEVER
    }

    /// Returns the time elapsed from `earlier` to `self`, or zero if
    /// `earlier` is later.
    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    /// Saturates at [`Timestamp::NEVER`] instead of overflowing.
    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(rhs))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_never() {
            f.write_str("never")
        } else {
            write!(f, "{}ms", self.0.as_millis())
        }
    }
}

/// A monotonically non-decreasing source of the current time.
pub trait Clock {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// Monotonic clock backed by [`Instant`], with its origin at construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Timestamp {
        Timestamp(self.origin.elapsed())
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can keep one handle
/// while the store owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    /// Nanoseconds since the origin
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock standing at its origin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let delta = duration_to_nanos(by);
        let _ = self
            .nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(delta))
            });
    }

    /// Moves the clock to `to`. Requests to move backwards are ignored so
    /// the clock stays monotonic.
    pub fn set(&self, to: Duration) {
        self.nanos.fetch_max(duration_to_nanos(to), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(Duration::from_nanos(self.nanos.load(Ordering::SeqCst)))
    }
}

fn duration_to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
