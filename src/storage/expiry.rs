//! Background Expiry Sweeper
//!
//! Reads only hide expired records (lazy expiry). Memory is reclaimed by
//! calling [`KvStorage::remove_one_expired_entry`], which the engine never
//! does on its own. This module drives that call from a background Tokio
//! task for processes that embed the store behind a lock.
//!
//! ## Design
//!
//! The sweeper runs as a Tokio task and:
//! 1. Sleeps for a configurable interval (default: 100ms)
//! 2. Locks the store and reclaims up to `max_evictions_per_sweep` records
//! 3. Logs statistics about the cleanup
//!
//! ## Adaptive Frequency
//!
//! If a large fraction of the store expired, the sweeper runs more often.
//! If nothing expired, it backs off to save CPU.

use crate::clock::Clock;
use crate::storage::{KvStorage, SharedStorage};
use std::sync::MutexGuard;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Errors reported for an invalid [`SweeperConfig`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// The minimum interval is zero, which would spin the task
    #[error("min_interval must be greater than zero")]
    ZeroMinInterval,

    /// The intervals are not ordered `min <= base <= max`
    #[error("intervals must satisfy min ({min:?}) <= base ({base:?}) <= max ({max:?})")]
    IntervalOrder {
        min: Duration,
        base: Duration,
        max: Duration,
    },

    /// A threshold is outside `[0.0, 1.0]`
    #[error("{name} must be within [0.0, 1.0], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f64 },

    /// The slowdown threshold is above the speedup threshold
    #[error("slowdown_threshold ({slowdown}) must not exceed speedup_threshold ({speedup})")]
    ThresholdOrder { slowdown: f64, speedup: f64 },

    /// A sweep would never reclaim anything
    #[error("max_evictions_per_sweep must be greater than zero")]
    ZeroEvictionBudget,
}

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Base interval between sweeps (default: 100ms)
    pub base_interval: Duration,

    /// Minimum interval between sweeps (default: 10ms)
    pub min_interval: Duration,

    /// Maximum interval between sweeps (default: 1s)
    pub max_interval: Duration,

    /// If this fraction of stored records was reclaimed, speed up sweeping
    pub speedup_threshold: f64,

    /// If less than this fraction was reclaimed, slow down sweeping
    pub slowdown_threshold: f64,

    /// Upper bound on records reclaimed while holding the lock (default: 1000)
    pub max_evictions_per_sweep: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            speedup_threshold: 0.25,  // Speed up if >25% of records expired
            slowdown_threshold: 0.01, // Slow down if <1% of records expired
            max_evictions_per_sweep: 1000,
        }
    }
}

impl SweeperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_interval(mut self, interval: Duration) -> Self {
        self.base_interval = interval;
        self
    }

    pub fn with_interval_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_interval = min;
        self.max_interval = max;
        self
    }

    pub fn with_thresholds(mut self, slowdown: f64, speedup: f64) -> Self {
        self.slowdown_threshold = slowdown;
        self.speedup_threshold = speedup;
        self
    }

    pub fn with_max_evictions_per_sweep(mut self, max: usize) -> Self {
        self.max_evictions_per_sweep = max;
        self
    }

    /// Checks that the configuration describes a sweeper that can run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_interval.is_zero() {
            return Err(ConfigError::ZeroMinInterval);
        }
        if self.min_interval > self.base_interval || self.base_interval > self.max_interval {
            return Err(ConfigError::IntervalOrder {
                min: self.min_interval,
                base: self.base_interval,
                max: self.max_interval,
            });
        }
        for (name, value) in [
            ("speedup_threshold", self.speedup_threshold),
            ("slowdown_threshold", self.slowdown_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        if self.slowdown_threshold > self.speedup_threshold {
            return Err(ConfigError::ThresholdOrder {
                slowdown: self.slowdown_threshold,
                speedup: self.speedup_threshold,
            });
        }
        if self.max_evictions_per_sweep == 0 {
            return Err(ConfigError::ZeroEvictionBudget);
        }
        Ok(())
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Validates `config` and starts the sweeper as a background task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```
    /// use ttlkv::storage::{shared, ExpirySweeper, KvStorage, SweeperConfig};
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let store = shared(KvStorage::default());
    /// let sweeper = ExpirySweeper::start(store.clone(), SweeperConfig::default()).unwrap();
    ///
    /// // Sweeper runs in the background...
    ///
    /// // Dropping the sweeper will stop it
    /// drop(sweeper);
    /// # }
    /// ```
    pub fn start<C>(store: SharedStorage<C>, config: SweeperConfig) -> Result<Self, ConfigError>
    where
        C: Clock + Send + 'static,
    {
        config.validate()?;
        Ok(Self::spawn(store, config))
    }

    fn spawn<C>(store: SharedStorage<C>, config: SweeperConfig) -> Self
    where
        C: Clock + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(store, config, shutdown_rx));

        info!("Background expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Stops the expiry sweeper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        info!("Background expiry sweeper stopped");
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The result of a single sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SweepOutcome {
    keys_before: usize,
    reclaimed: usize,
}

fn lock<C>(store: &SharedStorage<C>) -> MutexGuard<'_, KvStorage<C>> {
    store.lock().unwrap_or_else(|poisoned| {
        warn!("Storage lock was poisoned, recovering");
        poisoned.into_inner()
    })
}

fn sweep_once<C: Clock>(store: &SharedStorage<C>, budget: usize) -> SweepOutcome {
    let mut guard = lock(store);
    let keys_before = guard.len();
    let reclaimed = guard.remove_expired(budget);
    SweepOutcome {
        keys_before,
        reclaimed,
    }
}

/// Picks the interval for the next sweep from the outcome of the last one.
fn next_interval(current: Duration, outcome: SweepOutcome, config: &SweeperConfig) -> Duration {
    if outcome.keys_before == 0 {
        return current;
    }

    let expiry_rate = outcome.reclaimed as f64 / outcome.keys_before as f64;

    if expiry_rate > config.speedup_threshold {
        // Many records expiring - speed up
        let next = (current / 2).max(config.min_interval);
        debug!(
            reclaimed = outcome.reclaimed,
            rate = %format!("{:.2}%", expiry_rate * 100.0),
            new_interval_ms = next.as_millis(),
            "High expiry rate, speeding up sweeper"
        );
        next
    } else if expiry_rate < config.slowdown_threshold && outcome.reclaimed == 0 {
        // Nothing expiring - slow down
        let next = (current * 2).min(config.max_interval);
        trace!(
            new_interval_ms = next.as_millis(),
            "Low expiry rate, slowing down sweeper"
        );
        next
    } else {
        current
    }
}

/// The main sweeper loop.
async fn sweeper_loop<C: Clock>(
    store: SharedStorage<C>,
    config: SweeperConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut current_interval = config.base_interval;

    loop {
        // Wait for the interval or shutdown signal
        tokio::select! {
            _ = tokio::time::sleep(current_interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let outcome = sweep_once(&store, config.max_evictions_per_sweep);
        current_interval = next_interval(current_interval, outcome, &config);

        if outcome.reclaimed > 0 {
            debug!(
                reclaimed = outcome.reclaimed,
                keys_remaining = outcome.keys_before - outcome.reclaimed,
                "Expired records cleaned up"
            );
        }
    }
}

/// Starts the expiry sweeper with default configuration.
///
/// This is a convenience function for simple use cases.
pub fn start_expiry_sweeper<C>(store: SharedStorage<C>) -> ExpirySweeper
where
    C: Clock + Send + 'static,
{
    ExpirySweeper::spawn(store, SweeperConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::shared;
    use bytes::Bytes;
    use std::sync::Arc;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn fast_config() -> SweeperConfig {
        SweeperConfig::default().with_base_interval(Duration::from_millis(10))
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(SweeperConfig::default().validate(), Ok(()));
        assert_eq!(fast_config().validate(), Ok(()));
    }

    #[test]
    fn test_config_rejects_bad_intervals() {
        let config = SweeperConfig::default()
            .with_interval_bounds(Duration::ZERO, Duration::from_secs(1));
        assert_eq!(config.validate(), Err(ConfigError::ZeroMinInterval));

        let config = SweeperConfig::default().with_base_interval(Duration::from_secs(5));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IntervalOrder { .. })
        ));
    }

    #[test]
    fn test_config_rejects_bad_thresholds() {
        let config = SweeperConfig::default().with_thresholds(0.01, 1.5);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ThresholdOutOfRange {
                name: "speedup_threshold",
                value: 1.5
            })
        );

        let config = SweeperConfig::default().with_thresholds(0.5, 0.25);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ThresholdOrder { .. })
        ));

        let config = SweeperConfig::default().with_max_evictions_per_sweep(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroEvictionBudget));
    }

    #[test]
    fn test_config_error_messages() {
        assert_eq!(
            ConfigError::ZeroEvictionBudget.to_string(),
            "max_evictions_per_sweep must be greater than zero"
        );
        assert_eq!(
            ConfigError::ThresholdOutOfRange {
                name: "slowdown_threshold",
                value: -1.0
            }
            .to_string(),
            "slowdown_threshold must be within [0.0, 1.0], got -1"
        );
    }

    #[test]
    fn test_next_interval_adapts() {
        let config = SweeperConfig::default();
        let base = config.base_interval;

        let busy = SweepOutcome {
            keys_before: 10,
            reclaimed: 5,
        };
        assert_eq!(next_interval(base, busy, &config), base / 2);
        assert_eq!(
            next_interval(config.min_interval, busy, &config),
            config.min_interval
        );

        let idle = SweepOutcome {
            keys_before: 10,
            reclaimed: 0,
        };
        assert_eq!(next_interval(base, idle, &config), base * 2);
        assert_eq!(
            next_interval(config.max_interval, idle, &config),
            config.max_interval
        );

        let empty = SweepOutcome {
            keys_before: 0,
            reclaimed: 0,
        };
        assert_eq!(next_interval(base, empty, &config), base);

        let moderate = SweepOutcome {
            keys_before: 100,
            reclaimed: 10,
        };
        assert_eq!(next_interval(base, moderate, &config), base);
    }

    #[test]
    fn test_sweep_once_respects_budget() {
        let clock = ManualClock::new();
        let store = shared(KvStorage::new(clock.clone()));
        {
            let mut guard = lock(&store);
            for i in 0..10 {
                guard.set(format!("key{}", i), "value", 1);
            }
        }
        clock.advance(Duration::from_secs(1));

        assert_eq!(
            sweep_once(&store, 3),
            SweepOutcome {
                keys_before: 10,
                reclaimed: 3
            }
        );
        assert_eq!(lock(&store).len(), 7);
    }

    /// Moves paused Tokio time forward in 1ms steps so every sweeper tick
    /// inside the window gets to run.
    async fn run_for(total: Duration) {
        let step = Duration::from_millis(1);
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            tokio::time::advance(step).await;
            tokio::task::yield_now().await;
            elapsed += step;
        }
    }

    /// Lets a freshly spawned sweeper register its first sleep.
    async fn settle() {
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_waits_for_first_tick() {
        let clock = ManualClock::new();
        let store = shared(KvStorage::new(clock.clone()));
        lock(&store).set("k", "v", 1);
        clock.advance(Duration::from_secs(1));

        let _sweeper = ExpirySweeper::start(Arc::clone(&store), fast_config()).unwrap();
        settle().await;

        run_for(Duration::from_millis(9)).await;
        assert_eq!(lock(&store).len(), 1);

        run_for(Duration::from_millis(2)).await;
        assert!(lock(&store).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_cleans_expired_keys() {
        init_tracing();
        let clock = ManualClock::new();
        let store = shared(KvStorage::new(clock.clone()));

        {
            let mut guard = lock(&store);
            for i in 0..10 {
                guard.set(format!("key{}", i), "value", 1);
            }
            guard.set("persistent", "value", 0);
            assert_eq!(guard.len(), 11);
        }

        let _sweeper = ExpirySweeper::start(Arc::clone(&store), fast_config()).unwrap();
        settle().await;

        // Nothing is due yet
        run_for(Duration::from_millis(50)).await;
        assert_eq!(lock(&store).len(), 11);

        // The idle sweeper has backed off to at most max_interval
        clock.advance(Duration::from_secs(1));
        run_for(Duration::from_secs(1)).await;

        let guard = lock(&store);
        assert_eq!(guard.len(), 1);
        assert_eq!(guard.get("persistent"), Some(Bytes::from("value")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_drop() {
        init_tracing();
        let clock = ManualClock::new();
        let store = shared(KvStorage::new(clock.clone()));

        {
            let _sweeper = ExpirySweeper::start(Arc::clone(&store), fast_config()).unwrap();
            settle().await;
            run_for(Duration::from_millis(50)).await;
            // Sweeper is dropped here
        }

        lock(&store).set("key", "value", 1);
        clock.advance(Duration::from_secs(1));

        // Records should NOT be reclaimed since the sweeper is stopped
        run_for(Duration::from_secs(2)).await;

        let guard = lock(&store);
        assert_eq!(guard.len(), 1);
        assert!(guard.get("key").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_drains_large_backlog() {
        let clock = ManualClock::new();
        let store = shared(KvStorage::new(clock.clone()));

        {
            let mut guard = lock(&store);
            for i in 0..1000 {
                guard.set(format!("key{}", i), "value", 1);
            }
        }
        clock.advance(Duration::from_secs(1));

        let config = fast_config()
            .with_interval_bounds(Duration::from_millis(5), Duration::from_secs(1))
            .with_max_evictions_per_sweep(100);
        let _sweeper = ExpirySweeper::start(Arc::clone(&store), config).unwrap();
        settle().await;

        // 100 per sweep at a steady 10ms interval
        run_for(Duration::from_millis(25)).await;
        assert_eq!(lock(&store).len(), 800);

        run_for(Duration::from_millis(150)).await;
        assert!(lock(&store).is_empty());
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let store = shared(KvStorage::new(ManualClock::new()));
        let config = SweeperConfig::default().with_max_evictions_per_sweep(0);

        assert!(matches!(
            ExpirySweeper::start(store, config),
            Err(ConfigError::ZeroEvictionBudget)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_expiry_sweeper_defaults() {
        let clock = ManualClock::new();
        let store = shared(KvStorage::new(clock.clone()));
        lock(&store).set("k", "v", 1);

        let sweeper = start_expiry_sweeper(Arc::clone(&store));
        settle().await;
        clock.advance(Duration::from_secs(1));

        // First tick at the default 100ms base interval
        run_for(Duration::from_millis(150)).await;
        sweeper.stop();

        assert!(lock(&store).is_empty());
    }
}
